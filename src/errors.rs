//! Typed error hierarchy for perflens.
//!
//! One enum per subsystem:
//! - `ConfigError`: startup configuration, fatal
//! - `HostError`: code-hosting API transport failures
//! - `ParserError`: external source parser failures
//! - `StageError`: a single artifact's stage sequence failed
//! - `SessionError`: session store persistence failures
//! - `WorkflowError`: PR-level workflow failures

use thiserror::Error;

/// Errors raised while resolving configuration and credentials.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not set. {hint}")]
    MissingCredential { var: &'static str, hint: &'static str },

    #[error("Invalid repository '{0}': expected the form owner/repo")]
    InvalidRepository(String),

    #[error("Invalid GitHub PR URL: {input}\nExpected format: https://github.com/owner/repo/pull/123")]
    InvalidPrUrl { input: String },

    #[error("Invalid input '{input}': expected either a PR number or a GitHub PR URL")]
    InvalidPrNumber { input: String },

    #[error("Invalid severity '{0}'. Valid values: low, medium, high, critical")]
    InvalidSeverity(String),

    #[error("Invalid output format '{0}'. Valid values: markdown, json, github")]
    InvalidFormat(String),

    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    FileParse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Transport errors from the code-hosting API.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GitHub API returned {status} for {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Pull request {0} has no head commit")]
    MissingHeadSha(u64),
}

/// Failures of the external source parser process.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Failed to spawn parser '{cmd}': {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parser I/O failed: {0}")]
    Io(#[source] std::io::Error),

    #[error("Parser timeout after {secs}s (file may be too large or complex)")]
    Timeout { secs: u64 },

    #[error("Parser exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Parser returned empty output")]
    EmptyOutput,

    #[error("Invalid JSON from parser: {source} (output starts with: {preview})")]
    InvalidJson {
        preview: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Parser reported failure: {0}")]
    Reported(String),
}

/// Errors that abort one artifact's stage sequence.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Parse stage failed for {artifact}: {source}")]
    Parse {
        artifact: String,
        #[source]
        source: ParserError,
    },

    #[error("Failed to spawn reasoning backend '{cmd}': {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stage '{stage}' I/O failed: {source}")]
    Io {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stage '{stage}' timed out after {secs}s")]
    Timeout { stage: String, secs: u64 },

    #[error("Stage '{stage}' exited with code {code}: {stderr}")]
    NonZeroExit {
        stage: String,
        code: i32,
        stderr: String,
    },

    #[error("Stage '{stage}' reported an error: {message}")]
    Backend { stage: String, message: String },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors from the session store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session store I/O failed at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session store at {path} is corrupt: {source}")]
    Corrupt {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Session {0} does not exist")]
    UnknownSession(String),
}

/// Errors that abort a whole PR-level run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_carries_remediation() {
        let err = ConfigError::MissingCredential {
            var: "GITHUB_TOKEN",
            hint: "Create a token at https://github.com/settings/tokens",
        };
        let msg = err.to_string();
        assert!(msg.contains("GITHUB_TOKEN"));
        assert!(msg.contains("settings/tokens"));
    }

    #[test]
    fn invalid_pr_url_names_expected_format() {
        let err = ConfigError::InvalidPrUrl {
            input: "https://example.com/x".to_string(),
        };
        assert!(err.to_string().contains("github.com/owner/repo/pull/123"));
    }

    #[test]
    fn stage_error_converts_from_session_error() {
        let inner = SessionError::UnknownSession("s-1".to_string());
        let err: StageError = inner.into();
        match &err {
            StageError::Session(SessionError::UnknownSession(id)) => assert_eq!(id, "s-1"),
            _ => panic!("Expected StageError::Session"),
        }
    }

    #[test]
    fn parse_stage_error_wraps_parser_timeout() {
        let err = StageError::Parse {
            artifact: "src/App.tsx".to_string(),
            source: ParserError::Timeout { secs: 30 },
        };
        let msg = err.to_string();
        assert!(msg.contains("src/App.tsx"));
        assert!(msg.contains("30s"));
    }

    #[test]
    fn host_status_error_is_matchable() {
        let err = HostError::Status {
            status: 422,
            url: "https://api.github.com/repos/o/r/pulls/1/reviews".to_string(),
            body: "Unprocessable".to_string(),
        };
        assert!(matches!(err, HostError::Status { status: 422, .. }));
        let wf: WorkflowError = err.into();
        assert!(matches!(wf, WorkflowError::Host(_)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ConfigError::InvalidSeverity("x".into()));
        assert_std_error(&HostError::MissingHeadSha(1));
        assert_std_error(&ParserError::EmptyOutput);
        assert_std_error(&StageError::Timeout {
            stage: "analyze".into(),
            secs: 1,
        });
        assert_std_error(&SessionError::UnknownSession("x".into()));
    }
}
