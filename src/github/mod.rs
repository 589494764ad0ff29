//! GitHub pull request access: PR reference parsing, changed files, file
//! content and review posting.

use async_trait::async_trait;
use regex::Regex;
use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::LazyLock;

use crate::errors::{ConfigError, HostError};
use crate::review::policy::{ReviewComment, ReviewEvent};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_HOST: &str = "github.com";
const USER_AGENT: &str = "perflens";
const PER_PAGE: usize = 100;

/// Extensions reviewed when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js"];

static PR_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?github\.com/([^/\s]+)/([^/\s]+)/pull/(\d+)(?:[/?#]|$)")
        .unwrap()
});

/// Known GitHub token prefixes.
const GITHUB_TOKEN_PREFIXES: &[&str] = &["ghp_", "github_pat_", "gho_", "ghu_", "ghs_", "ghr_"];

/// Format check only; the token is not verified against the API.
pub fn is_valid_github_token(token: &str) -> bool {
    !token.is_empty()
        && GITHUB_TOKEN_PREFIXES
            .iter()
            .any(|prefix| token.starts_with(prefix))
}

/// A pull request named by number, optionally with its repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrReference {
    /// `owner/repo` when the reference was a URL.
    pub repository: Option<String>,
    pub number: u64,
}

/// Parse `https://github.com/owner/repo/pull/123` (scheme, `www.` and any
/// trailing path such as `/files` optional) into `("owner/repo", 123)`.
pub fn parse_pr_url(url: &str) -> Result<(String, u64), ConfigError> {
    let invalid = || ConfigError::InvalidPrUrl {
        input: url.to_string(),
    };
    let caps = PR_URL_REGEX.captures(url.trim()).ok_or_else(invalid)?;
    let number: u64 = caps[3].parse().map_err(|_| invalid())?;
    Ok((format!("{}/{}", &caps[1], &caps[2]), number))
}

/// Parse CLI input that is either a PR number or a PR URL.
pub fn parse_pr_reference(input: &str) -> Result<PrReference, ConfigError> {
    let trimmed = input.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        let number = trimmed
            .parse::<u64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ConfigError::InvalidPrNumber {
                input: input.to_string(),
            })?;
        return Ok(PrReference {
            repository: None,
            number,
        });
    }

    if trimmed.contains("github.com") || trimmed.contains('/') {
        let (repository, number) = parse_pr_url(trimmed)?;
        return Ok(PrReference {
            repository: Some(repository),
            number,
        });
    }

    Err(ConfigError::InvalidPrNumber {
        input: input.to_string(),
    })
}

/// Check that `repository` has the form `owner/repo`.
pub fn validate_repository(repository: &str) -> Result<String, ConfigError> {
    let parts: Vec<&str> = repository.trim().split('/').collect();
    if parts.len() == 2 && parts.iter().all(|p| !p.is_empty()) {
        Ok(format!("{}/{}", parts[0], parts[1]))
    } else {
        Err(ConfigError::InvalidRepository(repository.to_string()))
    }
}

/// A file changed by a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub contents_url: Option<String>,
}

/// Added or modified files with a reviewable extension.
pub fn is_reviewable(file: &ChangedFile, extensions: &[String]) -> bool {
    let ext_ok = Path::new(&file.filename)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.trim_start_matches('.') == e));
    ext_ok && matches!(file.status.as_str(), "added" | "modified")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReviewResponse {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommentResponse {
    pub id: u64,
}

/// Operations the workflow needs from the code host.
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// `owner/repo` this host is bound to.
    fn repository(&self) -> &str;

    /// Host name used to derive run identities.
    fn host(&self) -> &str {
        DEFAULT_HOST
    }

    /// Reviewable changed files of a pull request, across all pages.
    async fn list_changed_files(&self, pr_number: u64) -> Result<Vec<ChangedFile>, HostError>;

    async fn fetch_content(&self, file: &ChangedFile, git_ref: &str) -> Result<String, HostError>;

    async fn head_sha(&self, pr_number: u64) -> Result<String, HostError>;

    async fn create_review(
        &self,
        pr_number: u64,
        commit_id: &str,
        body: &str,
        event: ReviewEvent,
        comments: &[ReviewComment],
    ) -> Result<ReviewResponse, HostError>;

    /// Post one inline comment; uses the PR head when `commit_id` is `None`.
    async fn post_comment(
        &self,
        pr_number: u64,
        path: &str,
        line: u32,
        body: &str,
        commit_id: Option<&str>,
    ) -> Result<CommentResponse, HostError>;
}

/// Request body for the create-review endpoint. Comments target the new
/// version of the file.
pub fn review_payload(
    commit_id: &str,
    body: &str,
    event: ReviewEvent,
    comments: &[ReviewComment],
) -> serde_json::Value {
    let comments: Vec<serde_json::Value> = comments
        .iter()
        .map(|c| json!({"path": c.path, "line": c.line, "body": c.body, "side": "RIGHT"}))
        .collect();
    json!({
        "commit_id": commit_id,
        "body": body,
        "event": event,
        "comments": comments,
    })
}

#[derive(Debug, Deserialize)]
struct PullRequestHead {
    head: HeadRef,
}

#[derive(Debug, Deserialize)]
struct HeadRef {
    #[serde(default)]
    sha: Option<String>,
}

/// REST client bound to one repository.
pub struct GitHubClient {
    http: reqwest::Client,
    token: String,
    repository: String,
    api_base: String,
    extensions: Vec<String>,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>, repository: impl Into<String>) -> Self {
        let token = token.into();
        if !is_valid_github_token(&token) {
            tracing::warn!(
                "GITHUB_TOKEN does not have a known prefix (ghp_, github_pat_, ...); requests may fail"
            );
        }
        Self {
            http: reqwest::Client::new(),
            token,
            repository: repository.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!("{}/repos/{}/{}", self.api_base, self.repository, suffix)
    }

    fn authed(&self, builder: RequestBuilder, accept: &str) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", accept)
    }

    async fn send(&self, builder: RequestBuilder, url: &str) -> Result<Response, HostError> {
        let resp = builder.send().await.map_err(|source| HostError::Request {
            url: url.to_string(),
            source,
        })?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(HostError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        })
    }

    async fn json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        url: &str,
    ) -> Result<T, HostError> {
        self.send(builder, url)
            .await?
            .json()
            .await
            .map_err(|source| HostError::Decode {
                url: url.to_string(),
                source,
            })
    }
}

#[async_trait]
impl CodeHost for GitHubClient {
    fn repository(&self) -> &str {
        &self.repository
    }

    async fn list_changed_files(&self, pr_number: u64) -> Result<Vec<ChangedFile>, HostError> {
        let url = self.repo_url(&format!("pulls/{}/files", pr_number));
        let mut all_files = Vec::new();
        let mut page = 1u32;

        loop {
            let request = self
                .authed(self.http.get(&url), "application/vnd.github.v3+json")
                .query(&[
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ]);
            let files: Vec<ChangedFile> = self.json(request, &url).await?;
            let count = files.len();
            all_files.extend(files);
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        let total = all_files.len();
        let reviewable: Vec<ChangedFile> = all_files
            .into_iter()
            .filter(|f| is_reviewable(f, &self.extensions))
            .collect();
        tracing::info!(
            pr = pr_number,
            changed = total,
            reviewable = reviewable.len(),
            "Listed changed files"
        );
        Ok(reviewable)
    }

    async fn fetch_content(&self, file: &ChangedFile, git_ref: &str) -> Result<String, HostError> {
        let (url, request) = match file.contents_url {
            Some(ref contents_url) => (contents_url.clone(), self.http.get(contents_url)),
            None => {
                let url = self.repo_url(&format!("contents/{}", file.filename));
                let request = self.http.get(&url).query(&[("ref", git_ref)]);
                (url, request)
            }
        };
        let request = self.authed(request, "application/vnd.github.v3.raw");
        self.send(request, &url)
            .await?
            .text()
            .await
            .map_err(|source| HostError::Decode { url, source })
    }

    async fn head_sha(&self, pr_number: u64) -> Result<String, HostError> {
        let url = self.repo_url(&format!("pulls/{}", pr_number));
        let request = self.authed(self.http.get(&url), "application/vnd.github.v3+json");
        let pr: PullRequestHead = self.json(request, &url).await?;
        pr.head
            .sha
            .filter(|s| !s.is_empty())
            .ok_or(HostError::MissingHeadSha(pr_number))
    }

    async fn create_review(
        &self,
        pr_number: u64,
        commit_id: &str,
        body: &str,
        event: ReviewEvent,
        comments: &[ReviewComment],
    ) -> Result<ReviewResponse, HostError> {
        let url = self.repo_url(&format!("pulls/{}/reviews", pr_number));
        let request = self
            .authed(self.http.post(&url), "application/vnd.github.v3+json")
            .json(&review_payload(commit_id, body, event, comments));
        tracing::info!(pr = pr_number, %event, comments = comments.len(), "Creating review");
        self.json(request, &url).await
    }

    async fn post_comment(
        &self,
        pr_number: u64,
        path: &str,
        line: u32,
        body: &str,
        commit_id: Option<&str>,
    ) -> Result<CommentResponse, HostError> {
        let commit_id = match commit_id {
            Some(sha) => sha.to_string(),
            None => self.head_sha(pr_number).await?,
        };
        let url = self.repo_url(&format!("pulls/{}/comments", pr_number));
        let request = self
            .authed(self.http.post(&url), "application/vnd.github.v3+json")
            .json(&json!({
                "body": body,
                "commit_id": commit_id,
                "path": path,
                "line": line,
                "side": "RIGHT",
            }));
        self.json(request, &url).await
    }
}
