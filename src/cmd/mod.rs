//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `review`  | `Review`         |
//! | `analyze` | `Analyze`        |

pub mod analyze;
pub mod review;

pub use analyze::cmd_analyze;
pub use review::cmd_review;

use std::path::Path;
use std::sync::Arc;

use perflens::config::{PerflensToml, env_lookup};
use perflens::parser::NodeParser;
use perflens::pipeline::{ClaudeExecutor, StageOrchestrator};
use perflens::session::{FileSessionStore, InMemorySessionStore, SessionStore};
use perflens::workflow::ArtifactRunner;

/// Session store selected by `[memory] session_file`.
pub(crate) fn session_store(config: &PerflensToml, project_dir: &Path) -> Arc<dyn SessionStore> {
    match &config.memory.session_file {
        Some(path) => Arc::new(FileSessionStore::new(project_dir.join(path))),
        None => Arc::new(InMemorySessionStore::new()),
    }
}

/// Wire the parser, reasoning backend and store into an artifact runner.
pub(crate) fn artifact_runner(
    config: &PerflensToml,
    store: Arc<dyn SessionStore>,
    api_key: String,
) -> ArtifactRunner {
    let parser = NodeParser::new(config.parser.cmd.clone(), config.parser.args.clone())
        .with_timeout(std::time::Duration::from_secs(config.parser.timeout_secs));
    let executor = ClaudeExecutor::new(config.claude_config(Some(api_key), env_lookup));
    let orchestrator = StageOrchestrator::new(Arc::new(executor), Arc::new(parser), store);
    ArtifactRunner::new(Arc::new(orchestrator), config.memory.max_words)
}
