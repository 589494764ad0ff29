//! Configuration for perflens.
//!
//! Settings are layered: built-in defaults, then `.perflens/perflens.toml`,
//! then environment variables, then CLI flags (applied by the command
//! handlers).
//!
//! # Configuration File Format
//!
//! ```toml
//! [backend]
//! claude_cmd = "claude"
//! model = "sonnet"
//! skip_permissions = false
//! stage_timeout_secs = 600
//! mcp_config = ".perflens/mcp.json"
//! tool_server = "react-analyzer"
//!
//! [parser]
//! cmd = "node"
//! args = ["parser/dist/cli.js"]
//! timeout_secs = 30
//!
//! [review]
//! severity = "medium"
//! auto_approve = false
//! footer = "React Performance Analyzer"
//!
//! [memory]
//! max_words = 120
//! session_file = ".perflens/sessions.json"
//!
//! [files]
//! extensions = ["tsx", "ts", "jsx", "js"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::github::{DEFAULT_EXTENSIONS, validate_repository};
use crate::parser::DEFAULT_PARSER_TIMEOUT_SECS;
use crate::pipeline::executor::{ClaudeConfig, DEFAULT_STAGE_TIMEOUT_SECS, DEFAULT_TOOL_SERVER};
use crate::review::findings::Severity;
use crate::review::policy::DEFAULT_FOOTER;

pub const CONFIG_DIR: &str = ".perflens";
pub const CONFIG_FILE: &str = "perflens.toml";

/// Default bound on the memory digest injected into prompts.
pub const DEFAULT_MEMORY_WORDS: usize = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub claude_cmd: Option<String>,
    pub model: Option<String>,
    pub skip_permissions: bool,
    pub stage_timeout_secs: u64,
    pub mcp_config: Option<PathBuf>,
    pub tool_server: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            claude_cmd: None,
            model: None,
            skip_permissions: false,
            stage_timeout_secs: DEFAULT_STAGE_TIMEOUT_SECS,
            mcp_config: None,
            tool_server: DEFAULT_TOOL_SERVER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub cmd: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            cmd: "node".to_string(),
            args: vec!["parser/dist/cli.js".to_string()],
            timeout_secs: DEFAULT_PARSER_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub severity: Severity,
    pub auto_approve: bool,
    pub footer: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            severity: Severity::Medium,
            auto_approve: false,
            footer: DEFAULT_FOOTER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_words: usize,
    /// Persist sessions to this file instead of memory. Deleted at run end.
    pub session_file: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MEMORY_WORDS,
            session_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub extensions: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Root of `perflens.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerflensToml {
    pub backend: BackendConfig,
    pub parser: ParserConfig,
    pub review: ReviewConfig,
    pub memory: MemoryConfig,
    pub files: FilesConfig,
}

impl PerflensToml {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::FileParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load `<project_dir>/.perflens/perflens.toml`, or defaults when absent.
    pub fn load_or_default(project_dir: &Path) -> Result<Self, ConfigError> {
        let path = project_dir.join(CONFIG_DIR).join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Claude command: file setting, then `CLAUDE_CMD`, then `claude`.
    pub fn claude_cmd(&self, env: impl Fn(&str) -> Option<String>) -> String {
        self.backend
            .claude_cmd
            .clone()
            .or_else(|| env("CLAUDE_CMD"))
            .unwrap_or_else(|| "claude".to_string())
    }

    /// `SKIP_PERMISSIONS` overrides the file setting when set.
    pub fn skip_permissions(&self, env: impl Fn(&str) -> Option<String>) -> bool {
        match env("SKIP_PERMISSIONS") {
            Some(value) => value != "false",
            None => self.backend.skip_permissions,
        }
    }

    pub fn claude_config(
        &self,
        api_key: Option<String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> ClaudeConfig {
        ClaudeConfig {
            claude_cmd: self.claude_cmd(&env),
            model: self.backend.model.clone(),
            skip_permissions: self.skip_permissions(&env),
            mcp_config: self.backend.mcp_config.clone(),
            tool_server: self.backend.tool_server.clone(),
            stage_timeout: Duration::from_secs(self.backend.stage_timeout_secs),
            api_key,
        }
    }
}

/// Credentials required at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub github_token: String,
    /// `owner/repo`; `None` only when the caller supplies it another way.
    pub repository: Option<String>,
    pub anthropic_api_key: String,
}

impl Credentials {
    /// Resolve credentials through `lookup` (the process environment in
    /// production). `GITHUB_REPOSITORY` is required only when `need_repository`;
    /// otherwise an unusable value is ignored with a warning.
    pub fn resolve(
        lookup: impl Fn(&str) -> Option<String>,
        need_repository: bool,
    ) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let github_token = get("GITHUB_TOKEN").ok_or(ConfigError::MissingCredential {
            var: "GITHUB_TOKEN",
            hint: "Create a token with repo scope at https://github.com/settings/tokens and export it.",
        })?;

        let repository = match get("GITHUB_REPOSITORY") {
            Some(repo) if need_repository => Some(validate_repository(&repo)?),
            Some(repo) => match validate_repository(&repo) {
                Ok(repo) => Some(repo),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring GITHUB_REPOSITORY");
                    None
                }
            },
            None if need_repository => {
                return Err(ConfigError::MissingCredential {
                    var: "GITHUB_REPOSITORY",
                    hint: "Set it to owner/repo, or pass the full pull request URL instead of a number.",
                });
            }
            None => None,
        };

        let anthropic_api_key = Self::anthropic_key(&lookup)?;

        Ok(Self {
            github_token,
            repository,
            anthropic_api_key,
        })
    }

    /// Resolve only the reasoning backend credential.
    pub fn anthropic_key(lookup: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
        lookup("ANTHROPIC_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingCredential {
                var: "ANTHROPIC_API_KEY",
                hint: "Get an API key from https://console.anthropic.com and export it.",
            })
    }
}

/// Lookup backed by the process environment.
pub fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}
