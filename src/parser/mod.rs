//! Bridge to the external source parser.
//!
//! The parser is a separate process: it reads source text on stdin, takes a
//! virtual filename (which selects TSX/JSX syntax) and prints one JSON
//! payload on stdout. Any process-level failure is mapped onto a
//! [`ParserError`] so the caller can report the artifact as unanalyzable.
//!
//! [`ArtifactContext`] holds the parse result for one artifact and is passed
//! explicitly through the stage sequence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::ParserError;
use crate::util::truncate_str;

/// Parser calls that take longer than this are treated as failed.
pub const DEFAULT_PARSER_TIMEOUT_SECS: u64 = 30;

const PREVIEW_CHARS: usize = 200;

/// Structured payload printed by the parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub success: bool,
    #[serde(default)]
    pub components: Vec<Value>,
    #[serde(default)]
    pub imports: Vec<Value>,
    #[serde(default)]
    pub exports: Vec<Value>,
    #[serde(default)]
    pub errors: Vec<Value>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl ParseResult {
    /// First error message reported by the parser, if any.
    pub fn first_error(&self) -> Option<String> {
        self.errors.first().map(|e| {
            e.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| e.to_string())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookDescriptor {
    #[serde(rename = "type", default)]
    pub hook_type: String,
}

/// The subset of a parsed component the memory aggregator relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_memoized: bool,
    #[serde(default)]
    pub hooks: Vec<HookDescriptor>,
    /// Names of rendered child components.
    #[serde(default, deserialize_with = "child_names")]
    pub children: Vec<String>,
}

impl ComponentDescriptor {
    pub fn uses_any_hook(&self, names: &[&str]) -> bool {
        self.hooks.iter().any(|h| names.contains(&h.hook_type.as_str()))
    }
}

/// Children may be plain names or objects carrying a `name` field.
fn child_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect())
}

/// Parse result for the artifact currently moving through the stages.
#[derive(Debug, Clone, Default)]
pub struct ArtifactContext {
    result: ParseResult,
}

impl ArtifactContext {
    pub fn new(result: ParseResult) -> Self {
        Self { result }
    }

    pub fn result(&self) -> &ParseResult {
        &self.result
    }

    /// Raw component record by name.
    pub fn component(&self, name: &str) -> Option<&Value> {
        self.result
            .components
            .iter()
            .find(|c| c.get("name").and_then(Value::as_str) == Some(name))
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.result
            .components
            .iter()
            .filter_map(|c| c.get("name").and_then(Value::as_str))
            .collect()
    }

    /// Components that deserialize into descriptors; malformed records are
    /// skipped.
    pub fn descriptors(&self) -> Vec<ComponentDescriptor> {
        self.result
            .components
            .iter()
            .filter_map(|c| serde_json::from_value(c.clone()).ok())
            .collect()
    }

    /// Short overview embedded in stage prompts.
    pub fn overview(&self) -> String {
        let descriptors = self.descriptors();
        if descriptors.is_empty() {
            return "No React components were found by the parser.".to_string();
        }
        let mut lines = vec![format!("Parsed {} component(s):", descriptors.len())];
        for d in &descriptors {
            lines.push(format!(
                "- {} (memoized: {}, hooks: {}, children: {})",
                d.name,
                if d.is_memoized { "yes" } else { "no" },
                d.hooks.len(),
                d.children.len()
            ));
        }
        lines.join("\n")
    }
}

/// Seam for the external parser.
#[async_trait]
pub trait SourceParser: Send + Sync {
    async fn parse(&self, source: &str, filename: &str) -> Result<ParseResult, ParserError>;
}

/// Runs the Node-based parser CLI as a subprocess.
#[derive(Debug, Clone)]
pub struct NodeParser {
    cmd: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for NodeParser {
    fn default() -> Self {
        Self {
            cmd: "node".to_string(),
            args: vec!["parser/dist/cli.js".to_string()],
            timeout: Duration::from_secs(DEFAULT_PARSER_TIMEOUT_SECS),
        }
    }
}

impl NodeParser {
    pub fn new(cmd: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SourceParser for NodeParser {
    async fn parse(&self, source: &str, filename: &str) -> Result<ParseResult, ParserError> {
        tracing::debug!(cmd = %self.cmd, filename, bytes = source.len(), "Invoking parser");

        let mut child = Command::new(&self.cmd)
            .args(&self.args)
            .arg("--filename")
            .arg(filename)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ParserError::Spawn {
                cmd: self.cmd.clone(),
                source,
            })?;

        // Feed stdin while collecting output so neither pipe can stall the
        // other; the whole exchange is bounded. On elapse the child is
        // dropped and killed.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(source.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::time::timeout(self.timeout, async {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .map_err(|_| ParserError::Timeout {
            secs: self.timeout.as_secs(),
        })?;
        let output = output.map_err(ParserError::Io)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ParserError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: if stderr.is_empty() {
                    "Parser exited with non-zero code".to_string()
                } else {
                    stderr
                },
            });
        }

        match fed {
            // The parser may exit without consuming all input; its output decides.
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(ParserError::Io(e)),
            _ => decode_output(&String::from_utf8_lossy(&output.stdout)),
        }
    }
}

/// Decode the parser's stdout into a successful [`ParseResult`].
pub fn decode_output(stdout: &str) -> Result<ParseResult, ParserError> {
    if stdout.trim().is_empty() {
        return Err(ParserError::EmptyOutput);
    }
    let result: ParseResult =
        serde_json::from_str(stdout.trim()).map_err(|source| ParserError::InvalidJson {
            preview: truncate_str(stdout.trim(), PREVIEW_CHARS),
            source,
        })?;
    if !result.success {
        return Err(ParserError::Reported(
            result
                .first_error()
                .unwrap_or_else(|| "unknown parser error".to_string()),
        ));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ParseResult {
        serde_json::from_value(json!({
            "success": true,
            "components": [
                {
                    "name": "UserList",
                    "isMemoized": false,
                    "hooks": [{"type": "useState"}, {"type": "useSelector", "line": 4}],
                    "children": [{"name": "UserRow"}, "Footer"],
                    "props": [{"name": "users"}]
                },
                {"name": "UserRow", "isMemoized": true},
                {"name": 7}
            ],
            "imports": [],
            "exports": [],
            "errors": [],
            "metadata": {"filename": "UserList.tsx"}
        }))
        .unwrap()
    }

    #[test]
    fn test_descriptors_are_lenient() {
        let ctx = ArtifactContext::new(sample());
        let descriptors = ctx.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].children, vec!["UserRow", "Footer"]);
        assert!(descriptors[0].uses_any_hook(&["useSelector"]));
        assert!(descriptors[1].is_memoized);
        assert!(descriptors[1].hooks.is_empty());
    }

    #[test]
    fn test_component_lookup() {
        let ctx = ArtifactContext::new(sample());
        assert_eq!(ctx.component_names(), vec!["UserList", "UserRow"]);
        let list = ctx.component("UserList").unwrap();
        assert_eq!(list["props"][0]["name"], "users");
        assert!(ctx.component("Missing").is_none());
    }

    #[test]
    fn test_overview_mentions_components() {
        let overview = ArtifactContext::new(sample()).overview();
        assert!(overview.contains("Parsed 2 component(s)"));
        assert!(overview.contains("- UserRow (memoized: yes"));
        let empty = ArtifactContext::default().overview();
        assert!(empty.contains("No React components"));
    }

    #[test]
    fn test_decode_output_failures() {
        assert!(matches!(decode_output("  \n"), Err(ParserError::EmptyOutput)));
        assert!(matches!(
            decode_output("SyntaxError at 1:1"),
            Err(ParserError::InvalidJson { .. })
        ));
        let reported = decode_output(
            r#"{"success": false, "errors": [{"message": "Unexpected token"}]}"#,
        );
        match reported {
            Err(ParserError::Reported(msg)) => assert_eq!(msg, "Unexpected token"),
            other => panic!("Expected Reported, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_output_success() {
        let result = decode_output(r#"{"success": true, "components": [{"name": "A"}]}"#).unwrap();
        assert_eq!(result.components.len(), 1);
        assert!(result.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let parser = NodeParser::new("perflens-no-such-parser-binary", Vec::new());
        let err = parser.parse("const a = 1;", "a.tsx").await.unwrap_err();
        assert!(matches!(err, ParserError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_typed() {
        let parser = NodeParser::new("sh", vec!["-c".into(), "sleep 5".into(), "sh".into()])
            .with_timeout(Duration::from_millis(100));
        let err = parser.parse("", "a.tsx").await.unwrap_err();
        assert!(matches!(err, ParserError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_covers_stalled_stdin() {
        let parser = NodeParser::new("sh", vec!["-c".into(), "sleep 6".into(), "sh".into()])
            .with_timeout(Duration::from_millis(300));
        let source = "x".repeat(1024 * 1024);

        let start = std::time::Instant::now();
        let err = parser.parse(&source, "Big.tsx").await.unwrap_err();
        assert!(matches!(err, ParserError::Timeout { .. }), "got {:?}", err);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_parser_may_ignore_input() {
        let parser = NodeParser::new(
            "sh",
            vec![
                "-c".into(),
                r#"echo '{"success": true, "components": []}'"#.into(),
                "sh".into(),
            ],
        );
        let source = "x".repeat(1024 * 1024);
        let result = parser.parse(&source, "Big.tsx").await.unwrap();
        assert!(result.success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let parser = NodeParser::new(
            "sh",
            vec!["-c".into(), "echo boom >&2; exit 3".into(), "sh".into()],
        );
        match parser.parse("", "a.tsx").await {
            Err(ParserError::NonZeroExit { code, stderr }) => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("Expected NonZeroExit, got {:?}", other),
        }
    }
}
