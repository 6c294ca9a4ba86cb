//! Table output formatting for CLI commands
//!
//! Renders the selected squad and the ranked shortlist using comfy-table.
//! Colors follow `NO_COLOR` and dumb terminals.

use crate::domain::models::{PipelineResponse, Position, Provenance, RankedCandidate};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

const JUSTIFICATION_WIDTH: usize = 60;

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<usize>,
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub const fn with_config(use_colors: bool, max_width: Option<usize>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// The selected squad, one row per player, plus a summary footer.
    pub fn format_squad(&self, response: &PipelineResponse) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&[
            "Pos", "Player", "Club", "Price", "Ranker", "Consensus", "Agree", "Why",
        ]));

        for player in &response.players {
            let consensus = player
                .consensus_score
                .map_or_else(|| "-".to_string(), |s| format!("{s:.3}"));
            let agreement = player
                .agreement
                .map_or_else(|| "-".to_string(), |a| format!("{a:.2}"));
            let mut name = player.name.clone();
            if player.strong_pick {
                name.push_str(" *");
            }

            let agreement_cell = if self.use_colors && player.high_disagreement {
                Cell::new(agreement).fg(Color::Yellow)
            } else {
                Cell::new(agreement)
            };

            table.add_row(vec![
                self.position_cell(player.position),
                Cell::new(name),
                Cell::new(&player.club),
                Cell::new(format!("{:.1}", player.price)),
                Cell::new(format!("{:.3}", player.ranker_score)),
                Cell::new(consensus),
                agreement_cell,
                Cell::new(truncate_text(&player.justification, JUSTIFICATION_WIDTH)),
            ]);
        }

        let mut lines = vec![table.to_string()];
        lines.push(format!(
            "Provenance: {}  Spent: {:.1} / {:.1}  Remaining: {:.1}  Score: {:.3}",
            self.provenance_text(response.provenance),
            response.total_price,
            response.budget,
            response.remaining_budget,
            response.total_score,
        ));
        if let Some(reason) = &response.fallback_reason {
            lines.push(format!("Fallback reason: {reason}"));
        }
        let coverage = &response.coverage;
        lines.push(format!(
            "Panel: {} requests ({} failed), {} valid / {} invalid judgments, {} of {} candidates scored",
            coverage.requests,
            coverage.failed_requests,
            coverage.valid_results,
            coverage.invalid_results,
            coverage.consensus_candidates,
            coverage.shortlisted,
        ));
        lines.join("\n")
    }

    /// The ranked shortlist.
    pub fn format_shortlist(&self, candidates: &[RankedCandidate]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Rank", "Pos", "Player", "Club", "Price", "Score"]));

        for candidate in candidates {
            let record = &candidate.record;
            table.add_row(vec![
                Cell::new(candidate.rank),
                self.position_cell(record.position),
                Cell::new(&record.name),
                Cell::new(&record.club),
                Cell::new(format!("{:.1}", record.price)),
                Cell::new(format!("{:.4}", candidate.score)),
            ]);
        }

        table.to_string()
    }

    fn position_cell(&self, position: Position) -> Cell {
        if self.use_colors {
            Cell::new(position.code()).fg(position_color(position))
        } else {
            Cell::new(position.code())
        }
    }

    fn provenance_text(&self, provenance: Provenance) -> String {
        let text = provenance.to_string();
        if self.use_colors && provenance == Provenance::FallbackBuilt {
            format!("\x1b[33m{text}\x1b[0m")
        } else {
            text
        }
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();

        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(u16::try_from(width).unwrap_or(u16::MAX));
        }

        table
    }
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| Cell::new(t).add_attribute(Attribute::Bold))
        .collect()
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    true
}

const fn position_color(position: Position) -> Color {
    match position {
        Position::Goalkeeper => Color::Yellow,
        Position::Defender => Color::Green,
        Position::Midfielder => Color::Cyan,
        Position::Forward => Color::Red,
    }
}

/// Truncate text to max characters with ellipsis
fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
