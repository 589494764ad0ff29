use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::executor::{StageEvent, StageExecutor};
use super::extract::{Extraction, ResultExtractor};
use super::stages::{PARSE_CODE, StageSpec};
use crate::errors::StageError;
use crate::parser::{ArtifactContext, ParseResult, SourceParser};
use crate::review::format::OutputFormat;
use crate::session::{SessionHandle, SessionKey, SessionStore, purge_quietly};

/// One source file submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: String,
    pub content: String,
}

impl Artifact {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Fence language for the artifact's extension.
    pub fn language(&self) -> &'static str {
        match Path::new(&self.path).extension().and_then(|e| e.to_str()) {
            Some("ts") => "ts",
            Some("jsx") => "jsx",
            Some("js") => "js",
            _ => "tsx",
        }
    }
}

/// Which session a run executes in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionScope {
    /// A new session, purged when the run ends.
    Fresh,
    /// An existing or caller-owned session, left in place.
    Continue(SessionKey),
}

/// Everything one artifact's stage sequence produced.
#[derive(Debug, Clone)]
pub struct RawResult {
    pub session_id: String,
    pub events: Vec<StageEvent>,
    pub context: ArtifactContext,
    pub extraction: Extraction,
}

/// Runs the ordered stages for one artifact against one session.
///
/// The orchestrator does not interpret intermediate stage output. It
/// accumulates every event and hands the full stream to [`ResultExtractor`].
/// Any stage error aborts this artifact only; callers decide what happens
/// next.
pub struct StageOrchestrator {
    executor: Arc<dyn StageExecutor>,
    parser: Arc<dyn SourceParser>,
    store: Arc<dyn SessionStore>,
}

impl StageOrchestrator {
    pub fn new(
        executor: Arc<dyn StageExecutor>,
        parser: Arc<dyn SourceParser>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            executor,
            parser,
            store,
        }
    }

    pub async fn run(
        &self,
        stages: &[StageSpec],
        artifact: &Artifact,
        format: OutputFormat,
        memory_context: Option<&str>,
        scope: SessionScope,
    ) -> Result<RawResult, StageError> {
        let (key, fresh) = match scope {
            SessionScope::Fresh => (SessionKey::fresh(), true),
            SessionScope::Continue(key) => (key, false),
        };

        let start = Instant::now();
        let result = self
            .run_in_session(stages, artifact, format, memory_context, &key)
            .await;

        if fresh {
            purge_quietly(self.store.as_ref(), &key.session_id).await;
        }

        match &result {
            Ok(raw) => tracing::info!(
                artifact = %artifact.path,
                issues = raw.extraction.issues.len(),
                status = ?raw.extraction.status,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Artifact analyzed"
            ),
            Err(e) => tracing::warn!(artifact = %artifact.path, error = %e, "Artifact analysis failed"),
        }
        result
    }

    async fn run_in_session(
        &self,
        stages: &[StageSpec],
        artifact: &Artifact,
        format: OutputFormat,
        memory_context: Option<&str>,
        key: &SessionKey,
    ) -> Result<RawResult, StageError> {
        let mut existed = self.store.ensure(key).await?;
        let mut events = Vec::new();
        let mut context = ArtifactContext::default();
        let mut prompt_sent = false;

        for stage in stages {
            if stage.is_local() {
                let parsed = self
                    .parser
                    .parse(&artifact.content, &artifact.path)
                    .await
                    .map_err(|source| StageError::Parse {
                        artifact: artifact.path.clone(),
                        source,
                    })?;
                events.push(StageEvent::tool_result(
                    stage.name,
                    PARSE_CODE.name,
                    parse_summary(&parsed),
                ));
                context = ArtifactContext::new(parsed);
                continue;
            }

            let message = if prompt_sent {
                continuation_prompt(stage, artifact, format)
            } else {
                build_prompt(artifact, format, memory_context, &context)
            };
            let handle = SessionHandle {
                key: key.clone(),
                existed,
            };

            tracing::debug!(stage = stage.name, artifact = %artifact.path, "Executing stage");
            let stage_events = self.executor.execute(stage, &message, &handle).await?;
            // History is bookkeeping; losing an entry must not fail the artifact.
            if let Err(e) = self
                .store
                .append(
                    key,
                    json!({
                        "stage": stage.name,
                        "artifact": artifact.path,
                        "events": stage_events.len(),
                    }),
                )
                .await
            {
                tracing::warn!(stage = stage.name, session = %key.session_id, error = %e, "Failed to record stage history");
            }
            events.extend(stage_events);

            prompt_sent = true;
            existed = self.store.ensure(key).await?;
        }

        let extraction = ResultExtractor::extract(&events, &artifact.path);
        Ok(RawResult {
            session_id: key.session_id.clone(),
            events,
            context,
            extraction,
        })
    }
}

/// Payload recorded for the local parse stage.
fn parse_summary(result: &ParseResult) -> serde_json::Value {
    let names: Vec<&str> = result
        .components
        .iter()
        .filter_map(|c| c.get("name").and_then(serde_json::Value::as_str))
        .collect();
    json!({
        "success": result.success,
        "components_found": names,
        "total_components": result.components.len(),
        "errors": result.errors,
        "metadata": result.metadata,
    })
}

/// Prompt for the first backend stage of an artifact.
pub fn build_prompt(
    artifact: &Artifact,
    format: OutputFormat,
    memory_context: Option<&str>,
    context: &ArtifactContext,
) -> String {
    let mut sections = vec![format!(
        "Analyze this React code for performance issues. The report will be rendered as {}.",
        format
    )];

    if let Some(memory) = memory_context.map(str::trim).filter(|m| !m.is_empty()) {
        sections.push(format!(
            "## Context from previously analyzed files\n{}\n\nUse this context to flag \
             recurring patterns consistently.",
            memory
        ));
    }

    sections.push(format!(
        "File: {}\n\n```{}\n{}\n```",
        artifact.path,
        artifact.language(),
        artifact.content
    ));
    sections.push(context.overview());
    sections.push(format!(
        "Each issue must include:\n\
         - file: \"{}\"\n\
         - line: <line_number>\n\
         - component: <component_name>\n\
         - severity: \"critical\"|\"high\"|\"medium\"|\"low\"\n\
         - title: <brief_title>\n\
         - problem: <description>\n\
         - suggestion: <how_to_fix>",
        artifact.path
    ));
    sections.push(
        "Focus on:\n\
         - Critical: Inline functions/objects breaking memoization\n\
         - High: Unstable hook dependencies\n\
         - Medium: Unnecessary re-renders\n\
         - Low: Minor optimizations"
            .to_string(),
    );
    sections.push(
        "IMPORTANT: The final output MUST be a single JSON object of the form \
         {\"issues\": [...], \"summary\": {...}} with no explanations or additional text."
            .to_string(),
    );

    sections.join("\n\n")
}

fn continuation_prompt(stage: &StageSpec, artifact: &Artifact, format: OutputFormat) -> String {
    format!(
        "Continue the analysis of {} as the {} stage. The report will be rendered as {}; \
         keep the final output a single JSON object of the form {{\"issues\": [...], \
         \"summary\": {{...}}}}.",
        artifact.path, stage.name, format
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ParserError;
    use crate::pipeline::extract::ExtractionStatus;
    use crate::pipeline::stages::default_stages;
    use crate::errors::SessionError;
    use crate::session::InMemorySessionStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct StaticParser {
        fail: bool,
    }

    #[async_trait]
    impl SourceParser for StaticParser {
        async fn parse(&self, _source: &str, _filename: &str) -> Result<ParseResult, ParserError> {
            if self.fail {
                return Err(ParserError::Timeout { secs: 30 });
            }
            Ok(serde_json::from_value(json!({
                "success": true,
                "components": [{"name": "Feed", "isMemoized": false}]
            }))
            .unwrap())
        }
    }

    /// Records every call and answers the report stage with `report`.
    struct RecordingExecutor {
        calls: Mutex<Vec<(String, String, bool)>>,
        report: String,
        fail_stage: Option<&'static str>,
    }

    impl RecordingExecutor {
        fn new(report: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                report: report.to_string(),
                fail_stage: None,
            }
        }
    }

    #[async_trait]
    impl StageExecutor for RecordingExecutor {
        async fn execute(
            &self,
            stage: &StageSpec,
            prompt: &str,
            session: &SessionHandle,
        ) -> Result<Vec<StageEvent>, StageError> {
            self.calls.lock().unwrap().push((
                stage.name.to_string(),
                prompt.to_string(),
                session.existed,
            ));
            if self.fail_stage == Some(stage.name) {
                return Err(StageError::NonZeroExit {
                    stage: stage.name.to_string(),
                    code: 1,
                    stderr: String::new(),
                });
            }
            Ok(if stage.name == "reporter" {
                vec![StageEvent::final_text(stage.name, self.report.clone())]
            } else {
                vec![StageEvent::text(stage.name, "working")]
            })
        }
    }

    /// Store whose history writes always fail.
    struct ReadOnlyHistory(InMemorySessionStore);

    #[async_trait]
    impl SessionStore for ReadOnlyHistory {
        async fn ensure(&self, key: &SessionKey) -> Result<bool, SessionError> {
            self.0.ensure(key).await
        }

        async fn append(
            &self,
            _key: &SessionKey,
            _entry: serde_json::Value,
        ) -> Result<(), SessionError> {
            Err(SessionError::Io {
                path: "sessions.json".into(),
                source: std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full"),
            })
        }

        async fn history(&self, key: &SessionKey) -> Result<Vec<serde_json::Value>, SessionError> {
            self.0.history(key).await
        }

        async fn purge(&self, session_id: &str) -> Result<(), SessionError> {
            self.0.purge(session_id).await
        }

        async fn clear(&self) -> Result<(), SessionError> {
            self.0.clear().await
        }
    }

    fn orchestrator(
        executor: Arc<RecordingExecutor>,
        fail_parse: bool,
        store: Arc<InMemorySessionStore>,
    ) -> StageOrchestrator {
        StageOrchestrator::new(executor, Arc::new(StaticParser { fail: fail_parse }), store)
    }

    #[tokio::test]
    async fn test_stages_run_in_order_within_one_session() {
        let executor = Arc::new(RecordingExecutor::new(
            r#"{"issues": [{"title": "A", "severity": "critical"}]}"#,
        ));
        let store = Arc::new(InMemorySessionStore::new());
        let orch = orchestrator(executor.clone(), false, store.clone());

        let raw = orch
            .run(
                &default_stages(),
                &Artifact::new("src/Feed.tsx", "export const Feed = () => null;"),
                OutputFormat::Json,
                Some("Previously analyzed 1 file(s)"),
                SessionScope::Fresh,
            )
            .await
            .unwrap();

        let calls = executor.calls.lock().unwrap();
        let names: Vec<&str> = calls.iter().map(|c| c.0.as_str()).collect();
        assert_eq!(names, vec!["analyzer", "reasoner", "reporter"]);
        // First backend stage starts the session, later ones resume it.
        assert_eq!(
            calls.iter().map(|c| c.2).collect::<Vec<_>>(),
            vec![false, true, true]
        );
        assert!(calls[0].1.contains("Context from previously analyzed files"));
        assert!(calls[0].1.contains("```tsx"));
        assert!(calls[0].1.contains("- Feed (memoized: no"));
        assert!(calls[1].1.starts_with("Continue the analysis of src/Feed.tsx"));

        assert!(matches!(&raw.events[0], StageEvent::ToolResult { capability, .. } if capability == "parse_code"));
        assert_eq!(raw.extraction.status, ExtractionStatus::Parsed);
        assert_eq!(raw.extraction.issues[0].file, "src/Feed.tsx");
        assert_eq!(raw.context.component_names(), vec!["Feed"]);

        // Fresh sessions are purged after the run.
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_fresh_sessions_are_distinct_per_artifact() {
        let executor = Arc::new(RecordingExecutor::new(r#"{"issues": []}"#));
        let store = Arc::new(InMemorySessionStore::new());
        let orch = orchestrator(executor, false, store);
        let stages = default_stages();

        let a = orch
            .run(&stages, &Artifact::new("a.tsx", ""), OutputFormat::Json, None, SessionScope::Fresh)
            .await
            .unwrap();
        let b = orch
            .run(&stages, &Artifact::new("b.tsx", ""), OutputFormat::Json, None, SessionScope::Fresh)
            .await
            .unwrap();
        assert_ne!(a.session_id, b.session_id);
    }

    #[tokio::test]
    async fn test_continued_session_is_kept() {
        let executor = Arc::new(RecordingExecutor::new(r#"{"issues": []}"#));
        let store = Arc::new(InMemorySessionStore::new());
        let orch = orchestrator(executor.clone(), false, store.clone());
        let key = SessionKey::new("perflens", "u", "pr-run");

        orch.run(
            &default_stages(),
            &Artifact::new("a.tsx", ""),
            OutputFormat::Json,
            None,
            SessionScope::Continue(key.clone()),
        )
        .await
        .unwrap();

        assert!(store.contains("pr-run").await);
        assert_eq!(store.history(&key).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_parse_failure_aborts_artifact() {
        let executor = Arc::new(RecordingExecutor::new("{}"));
        let store = Arc::new(InMemorySessionStore::new());
        let orch = orchestrator(executor.clone(), true, store.clone());

        let err = orch
            .run(
                &default_stages(),
                &Artifact::new("big.tsx", ""),
                OutputFormat::Markdown,
                None,
                SessionScope::Fresh,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Parse { ref artifact, .. } if artifact == "big.tsx"));
        assert!(executor.calls.lock().unwrap().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_stage_failure_stops_later_stages() {
        let mut executor = RecordingExecutor::new("{}");
        executor.fail_stage = Some("reasoner");
        let executor = Arc::new(executor);
        let orch = orchestrator(executor.clone(), false, Arc::new(InMemorySessionStore::new()));

        let err = orch
            .run(
                &default_stages(),
                &Artifact::new("a.tsx", ""),
                OutputFormat::Json,
                None,
                SessionScope::Fresh,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::NonZeroExit { .. }));
        assert_eq!(executor.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_history_write_failure_keeps_result() {
        let executor = Arc::new(RecordingExecutor::new(
            r#"{"issues": [{"title": "A", "severity": "high"}]}"#,
        ));
        let store = Arc::new(ReadOnlyHistory(InMemorySessionStore::new()));
        let orch = StageOrchestrator::new(
            executor.clone(),
            Arc::new(StaticParser { fail: false }),
            store.clone(),
        );

        let raw = orch
            .run(
                &default_stages(),
                &Artifact::new("a.tsx", ""),
                OutputFormat::Json,
                None,
                SessionScope::Fresh,
            )
            .await
            .unwrap();

        assert_eq!(executor.calls.lock().unwrap().len(), 3);
        assert_eq!(raw.extraction.issues.len(), 1);
        assert!(store.0.is_empty().await);
    }

    #[test]
    fn test_build_prompt_without_memory() {
        let prompt = build_prompt(
            &Artifact::new("src/util.js", "const x = 1;"),
            OutputFormat::Github,
            None,
            &ArtifactContext::default(),
        );
        assert!(!prompt.contains("previously analyzed"));
        assert!(prompt.contains("```js\nconst x = 1;\n```"));
        assert!(prompt.contains("rendered as github"));
        assert!(prompt.contains("- file: \"src/util.js\""));
    }
}
