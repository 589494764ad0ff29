//! Stage execution against the reasoning backend.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::capabilities::capability_name;
use super::stages::StageSpec;
use crate::errors::StageError;
use crate::session::SessionHandle;
use crate::stream::{
    ContentBlock, StreamEvent, UserBlock, UserContent, describe_tool_use, parse_line,
    tool_result_payload,
};
use crate::util::truncate_str;

/// Default per-stage timeout for the reasoning backend.
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 600;

/// Default name of the tool server exposing the analysis capabilities.
pub const DEFAULT_TOOL_SERVER: &str = "react-analyzer";

/// Bytes of backend stderr kept for error messages.
const STDERR_TAIL_BYTES: usize = 4096;

/// One event in a stage's output stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageEvent {
    Text {
        stage: String,
        text: String,
        /// Set on the stage's terminal response.
        final_response: bool,
    },
    ToolResult {
        stage: String,
        capability: String,
        payload: Value,
    },
}

impl StageEvent {
    pub fn stage(&self) -> &str {
        match self {
            Self::Text { stage, .. } | Self::ToolResult { stage, .. } => stage,
        }
    }

    pub fn text(stage: &str, text: impl Into<String>) -> Self {
        Self::Text {
            stage: stage.to_string(),
            text: text.into(),
            final_response: false,
        }
    }

    pub fn final_text(stage: &str, text: impl Into<String>) -> Self {
        Self::Text {
            stage: stage.to_string(),
            text: text.into(),
            final_response: true,
        }
    }

    pub fn tool_result(stage: &str, capability: &str, payload: Value) -> Self {
        Self::ToolResult {
            stage: stage.to_string(),
            capability: capability_name(capability).to_string(),
            payload,
        }
    }
}

/// Executes one backend stage within a session.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(
        &self,
        stage: &StageSpec,
        prompt: &str,
        session: &SessionHandle,
    ) -> Result<Vec<StageEvent>, StageError>;
}

#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub claude_cmd: String,
    pub model: Option<String>,
    pub skip_permissions: bool,
    /// MCP configuration that provides the analysis capabilities.
    pub mcp_config: Option<PathBuf>,
    pub tool_server: String,
    pub stage_timeout: Duration,
    pub api_key: Option<String>,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            claude_cmd: "claude".to_string(),
            model: None,
            skip_permissions: false,
            mcp_config: None,
            tool_server: DEFAULT_TOOL_SERVER.to_string(),
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            api_key: None,
        }
    }
}

/// Runs each stage as a `claude --print` subprocess.
pub struct ClaudeExecutor {
    config: ClaudeConfig,
}

impl ClaudeExecutor {
    pub fn new(config: ClaudeConfig) -> Self {
        Self { config }
    }

    /// Build the CLI flags for one stage.
    pub fn claude_flags(&self, stage: &StageSpec, session: &SessionHandle) -> Vec<String> {
        let mut flags = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--append-system-prompt".to_string(),
            stage.instruction.to_string(),
        ];

        if !stage.capabilities.is_empty() {
            let tools: Vec<String> = stage
                .capabilities
                .iter()
                .map(|c| format!("mcp__{}__{}", self.config.tool_server, c.name))
                .collect();
            flags.push("--allowedTools".to_string());
            flags.push(tools.join(","));
        }

        if let Some(ref path) = self.config.mcp_config {
            flags.push("--mcp-config".to_string());
            flags.push(path.display().to_string());
        }

        if let Some(ref model) = self.config.model {
            flags.push("--model".to_string());
            flags.push(model.clone());
        }

        if self.config.skip_permissions {
            flags.push("--dangerously-skip-permissions".to_string());
        }

        let uuid = session.backend_uuid().to_string();
        if session.existed {
            flags.push("--resume".to_string());
        } else {
            flags.push("--session-id".to_string());
        }
        flags.push(uuid);

        flags
    }

    async fn run_stage(
        &self,
        stage: &StageSpec,
        prompt: &str,
        session: &SessionHandle,
    ) -> Result<Vec<StageEvent>, StageError> {
        let io_err = |source| StageError::Io {
            stage: stage.name.to_string(),
            source,
        };

        let mut cmd = Command::new(&self.config.claude_cmd);
        cmd.args(self.claude_flags(stage, session));
        if let Some(ref key) = self.config.api_key {
            cmd.env("ANTHROPIC_API_KEY", key);
        }

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StageError::Spawn {
                cmd: self.config.claude_cmd.clone(),
                source,
            })?;

        // stdin and stderr are serviced by their own tasks so a chatty
        // backend cannot block on a full pipe while stdout is being read.
        let stdin = child.stdin.take();
        let input = prompt.to_string();
        let feeder = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        });
        let stderr_tail = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_tail(stderr, STDERR_TAIL_BYTES)));

        let stdout = child.stdout.take().ok_or_else(|| StageError::Backend {
            stage: stage.name.to_string(),
            message: "stdout was not captured".to_string(),
        })?;
        let mut reader = BufReader::new(stdout).lines();
        let mut decoder = StreamDecoder::new(stage.name);

        while let Some(line) = reader.next_line().await.map_err(io_err)? {
            decoder.push_line(&line);
        }

        let status = child.wait().await.map_err(io_err)?;
        let stderr = match stderr_tail {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        match feeder.await {
            Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(io_err(e)),
            _ => {}
        }

        if !status.success() {
            return Err(StageError::NonZeroExit {
                stage: stage.name.to_string(),
                code: status.code().unwrap_or(-1),
                stderr,
            });
        }
        if !stderr.is_empty() {
            tracing::debug!(stage = stage.name, stderr = %stderr, "Backend stderr");
        }

        decoder.finish().map_err(|e| match e {
            StageError::Backend { stage, message } if !stderr.is_empty() => StageError::Backend {
                stage,
                message: format!("{} (stderr: {})", message, stderr),
            },
            other => other,
        })
    }
}

/// Read `reader` to the end, keeping only the last `limit` bytes.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut tail = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > limit {
                    tail.drain(..tail.len() - limit);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).trim().to_string()
}

#[async_trait]
impl StageExecutor for ClaudeExecutor {
    async fn execute(
        &self,
        stage: &StageSpec,
        prompt: &str,
        session: &SessionHandle,
    ) -> Result<Vec<StageEvent>, StageError> {
        let start = Instant::now();
        tracing::info!(stage = stage.name, session = session.id(), resume = session.existed, "Running stage");

        let events = tokio::time::timeout(
            self.config.stage_timeout,
            self.run_stage(stage, prompt, session),
        )
        .await
        .map_err(|_| StageError::Timeout {
            stage: stage.name.to_string(),
            secs: self.config.stage_timeout.as_secs(),
        })??;

        tracing::info!(
            stage = stage.name,
            events = events.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Stage finished"
        );
        Ok(events)
    }
}

/// Turns stream-json lines into [`StageEvent`]s for one stage.
///
/// Tool results are correlated with the preceding tool use by id so each
/// result carries the capability name that produced it.
pub struct StreamDecoder {
    stage: String,
    pending_tools: HashMap<String, String>,
    events: Vec<StageEvent>,
    error: Option<String>,
}

impl StreamDecoder {
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            pending_tools: HashMap::new(),
            events: Vec::new(),
            error: None,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        let Some(event) = parse_line(line) else {
            return;
        };

        match event {
            StreamEvent::Assistant { message, .. } => {
                for block in message.content {
                    match block {
                        ContentBlock::ToolUse { name, input, id } => {
                            tracing::debug!(stage = %self.stage, "{}", describe_tool_use(&name, &input));
                            self.pending_tools.insert(id, name);
                        }
                        ContentBlock::Text { text } => {
                            if !text.trim().is_empty() {
                                self.events.push(StageEvent::text(&self.stage, text));
                            }
                        }
                        ContentBlock::Other => {}
                    }
                }
            }
            StreamEvent::User { message } => {
                let UserContent::Blocks(blocks) = message.content else {
                    return;
                };
                for block in blocks {
                    if let UserBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } = block
                    {
                        let name = self
                            .pending_tools
                            .remove(&tool_use_id)
                            .unwrap_or_else(|| "unknown".to_string());
                        if is_error {
                            tracing::warn!(stage = %self.stage, capability = %name, "Capability call failed");
                            continue;
                        }
                        self.events.push(StageEvent::tool_result(
                            &self.stage,
                            &name,
                            tool_result_payload(&content),
                        ));
                    }
                }
            }
            StreamEvent::Result {
                result, is_error, ..
            } => {
                if is_error {
                    self.error = Some(result.unwrap_or_else(|| "unknown backend error".to_string()));
                } else if let Some(text) = result.filter(|t| !t.trim().is_empty()) {
                    self.events.push(StageEvent::final_text(&self.stage, text));
                }
            }
            StreamEvent::System { .. } => {}
        }
    }

    pub fn finish(self) -> Result<Vec<StageEvent>, StageError> {
        match self.error {
            Some(message) => Err(StageError::Backend {
                stage: self.stage,
                message: truncate_str(&message, 500),
            }),
            None => Ok(self.events),
        }
    }
}
