//! Pull request review workflow.

use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{AnalysisResult, ArtifactRunner, issue_breakdown};
use crate::errors::{HostError, WorkflowError};
use crate::github::CodeHost;
use crate::memory::{MemoryInsights, ProjectMemory};
use crate::pipeline::orchestrator::Artifact;
use crate::review::format::OutputFormat;
use crate::review::policy::{ArtifactIssues, ReviewDecision, ReviewEvent, ReviewPolicy};
use crate::session::{SessionKey, SessionStore, purge_quietly};

/// Minimum count for an issue type to be listed under `recurring_issues`.
const REPORTED_RECURRENCE: usize = 2;

/// Result of analyzing every reviewable file of a pull request.
#[derive(Debug, Clone, Serialize)]
pub struct PrAnalysis {
    pub pr_number: u64,
    pub repository: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,
    pub files_analyzed: usize,
    pub results: Vec<AnalysisResult>,
    pub total_issues: usize,
    pub issue_breakdown: BTreeMap<String, usize>,
    pub recurring_issues: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_warning: Option<String>,
    pub detected_conventions: BTreeMap<String, String>,
}

impl PrAnalysis {
    pub fn insights(&self) -> MemoryInsights {
        MemoryInsights {
            recurring_warning: self.recurring_warning.clone(),
            conventions: self.detected_conventions.clone(),
        }
    }
}

/// Result of `analyze_and_review`. The analysis survives a failed post.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub analysis: PrAnalysis,
    pub review_posted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_event: Option<ReviewEvent>,
    pub comments_posted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReviewOutcome {
    fn not_posted(analysis: PrAnalysis, reason: &str) -> Self {
        Self {
            analysis,
            review_posted: false,
            review_id: None,
            review_event: None,
            comments_posted: 0,
            error: None,
            reason: Some(reason.to_string()),
        }
    }
}

/// Analyzes a pull request's changed files and posts one review.
pub struct PrWorkflow {
    host: Arc<dyn CodeHost>,
    store: Arc<dyn SessionStore>,
    runner: ArtifactRunner,
    policy: ReviewPolicy,
}

impl PrWorkflow {
    pub fn new(
        host: Arc<dyn CodeHost>,
        store: Arc<dyn SessionStore>,
        runner: ArtifactRunner,
        policy: ReviewPolicy,
    ) -> Self {
        Self {
            host,
            store,
            runner,
            policy,
        }
    }

    /// Analyze every reviewable file of `pr_number` in order.
    ///
    /// Per-file failures are recorded in `results`. Listing the files or
    /// creating the run session are the only fatal steps. The run session is
    /// purged before returning; other sessions in a shared store are left
    /// alone.
    pub async fn analyze_pr(&self, pr_number: u64) -> Result<PrAnalysis, WorkflowError> {
        let run_key = SessionKey::for_run(self.host.host(), self.host.repository(), pr_number);
        let result = self.analyze_in_run(pr_number, &run_key).await;

        purge_quietly(self.store.as_ref(), &run_key.session_id).await;
        result
    }

    async fn analyze_in_run(
        &self,
        pr_number: u64,
        run_key: &SessionKey,
    ) -> Result<PrAnalysis, WorkflowError> {
        tracing::info!(
            repository = self.host.repository(),
            pr = pr_number,
            session = %run_key.session_id,
            "Analyzing pull request"
        );
        self.store.ensure(run_key).await?;

        let files = self.host.list_changed_files(pr_number).await?;
        tracing::info!(pr = pr_number, files = files.len(), "Reviewable files found");

        let head_sha = if files.is_empty() {
            None
        } else {
            Some(self.host.head_sha(pr_number).await?)
        };

        let mut memory = ProjectMemory::new();
        let mut results = Vec::with_capacity(files.len());
        for file in &files {
            let git_ref = head_sha.as_deref().unwrap_or("HEAD");
            let result = match self.host.fetch_content(file, git_ref).await {
                Ok(content) => {
                    let artifact = Artifact::new(&file.filename, content);
                    self.runner
                        .analyze(&mut memory, &artifact, OutputFormat::Json)
                        .await
                }
                Err(e) => {
                    tracing::warn!(file = %file.filename, error = %e, "Failed to fetch file content");
                    AnalysisResult::failed(&file.filename, e)
                }
            };

            let entry = json!({
                "file": result.file,
                "success": result.success,
                "issues": result.issues.len(),
            });
            if let Err(e) = self.store.append(run_key, entry).await {
                tracing::warn!(session = %run_key.session_id, error = %e, "Failed to record run history");
            }
            results.push(result);
        }

        let successful: Vec<&AnalysisResult> = results.iter().filter(|r| r.success).collect();
        let total_issues: usize = successful.iter().map(|r| r.issues.len()).sum();
        let breakdown = issue_breakdown(
            results
                .iter()
                .filter(|r| r.success)
                .flat_map(|r| r.issues.iter()),
        );
        let recurring_issues = memory
            .recurring_issues()
            .iter()
            .filter(|&(_, &count)| count >= REPORTED_RECURRENCE)
            .map(|(kind, &count)| (kind.clone(), count))
            .collect();

        Ok(PrAnalysis {
            pr_number,
            repository: self.host.repository().to_string(),
            session_id: run_key.session_id.clone(),
            head_sha,
            files_analyzed: successful.len(),
            total_issues,
            issue_breakdown: breakdown,
            recurring_issues,
            recurring_warning: memory.recurring_warning(),
            detected_conventions: memory.conventions().clone(),
            results,
        })
    }

    /// Analyze `pr_number` and, unless `analyze_only`, post one review.
    ///
    /// Only successfully analyzed files feed the review decision. A posting
    /// failure is reported in the outcome instead of discarding the analysis.
    pub async fn analyze_and_review(
        &self,
        pr_number: u64,
        analyze_only: bool,
    ) -> Result<ReviewOutcome, WorkflowError> {
        let analysis = self.analyze_pr(pr_number).await?;
        if analyze_only {
            return Ok(ReviewOutcome::not_posted(
                analysis,
                "Analysis only; no review was posted",
            ));
        }

        let decision = {
            let artifacts: Vec<ArtifactIssues<'_>> = analysis
                .results
                .iter()
                .filter(|r| r.success)
                .map(|r| ArtifactIssues {
                    path: &r.file,
                    issues: &r.issues,
                })
                .collect();
            self.policy.decide(&artifacts, &analysis.insights())
        };
        let Some(decision) = decision else {
            tracing::info!(pr = pr_number, "No files analyzed; skipping review");
            return Ok(ReviewOutcome::not_posted(analysis, "No files were analyzed"));
        };

        match self
            .post_review(pr_number, analysis.head_sha.as_deref(), &decision)
            .await
        {
            Ok(review_id) => {
                tracing::info!(
                    pr = pr_number,
                    review = review_id,
                    event = %decision.event,
                    comments = decision.comments.len(),
                    "Review posted"
                );
                Ok(ReviewOutcome {
                    analysis,
                    review_posted: true,
                    review_id: Some(review_id),
                    review_event: Some(decision.event),
                    comments_posted: decision.comments.len(),
                    error: None,
                    reason: None,
                })
            }
            Err(e) => {
                tracing::error!(pr = pr_number, error = %e, "Failed to post review");
                Ok(ReviewOutcome {
                    analysis,
                    review_posted: false,
                    review_id: None,
                    review_event: Some(decision.event),
                    comments_posted: 0,
                    error: Some(e.to_string()),
                    reason: None,
                })
            }
        }
    }

    async fn post_review(
        &self,
        pr_number: u64,
        head_sha: Option<&str>,
        decision: &ReviewDecision,
    ) -> Result<u64, HostError> {
        let commit_id = match head_sha {
            Some(sha) => sha.to_string(),
            None => self.host.head_sha(pr_number).await?,
        };
        let response = self
            .host
            .create_review(
                pr_number,
                &commit_id,
                &decision.body,
                decision.event,
                &decision.comments,
            )
            .await?;
        Ok(response.id)
    }
}
