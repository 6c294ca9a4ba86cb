//! Pipeline stages and their orchestration

pub mod consensus;
pub mod dispatcher;
pub mod expert_agent;
pub mod pipeline;
pub mod ranker;
pub mod result_assembler;
pub mod rotation;
pub mod squad_builder;

pub use consensus::ConsensusEngine;
pub use dispatcher::{parse_json_array, DispatchOutcome, DispatchStatus, Dispatcher, DispatcherConfig};
pub use expert_agent::{ExpertAgent, ExpertPanel, PanelReport, PersonaReport};
pub use pipeline::SquadPipeline;
pub use ranker::{Ranker, Ranking};
pub use result_assembler::{ResultAssembler, RunMetadata};
pub use rotation::{CredentialStats, RotationContext, RotationError, Route};
pub use squad_builder::SquadBuilder;
