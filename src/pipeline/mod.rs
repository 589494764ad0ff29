//! Per-artifact analysis pipeline.
//!
//! - [`stages`]: the ordered stage catalogue and advertised capabilities
//! - [`executor`]: the reasoning backend seam and its Claude CLI implementation
//! - [`orchestrator`]: runs the stages for one artifact within a session
//! - [`capabilities`]: typed capability results and their normalization
//! - [`extract`]: recovery of `{issues, summary}` from the event stream

pub mod capabilities;
pub mod executor;
pub mod extract;
pub mod orchestrator;
pub mod stages;

pub use capabilities::CapabilityResult;
pub use executor::{ClaudeConfig, ClaudeExecutor, StageEvent, StageExecutor};
pub use extract::{Extraction, ExtractionStatus, ResultExtractor};
pub use orchestrator::{Artifact, RawResult, SessionScope, StageOrchestrator};
pub use stages::{StageKind, StageSpec, default_stages};
