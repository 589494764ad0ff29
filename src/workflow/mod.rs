//! Run-level workflows.
//!
//! A run processes artifacts strictly one after another. Each artifact gets a
//! fresh session and a prompt seeded with the digest of everything analyzed
//! before it; its findings are then folded into the run's [`ProjectMemory`].
//! A failing artifact is recorded and the loop moves on.
//!
//! - [`ArtifactRunner`]: the shared sequential loop (used by `analyze`)
//! - [`PrWorkflow`]: pull request review on top of the runner

pub mod pr;

pub use pr::{PrAnalysis, PrWorkflow, ReviewOutcome};

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::memory::ProjectMemory;
use crate::pipeline::extract::ExtractionStatus;
use crate::pipeline::orchestrator::{Artifact, SessionScope, StageOrchestrator};
use crate::pipeline::stages::{StageSpec, default_stages};
use crate::review::findings::{Issue, ReportSummary, Severity};
use crate::review::format::OutputFormat;

/// Outcome of one artifact within a run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub file: String,
    pub success: bool,
    pub issues: Vec<Issue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReportSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ExtractionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    pub fn failed(file: impl Into<String>, error: impl ToString) -> Self {
        Self {
            file: file.into(),
            success: false,
            issues: Vec::new(),
            summary: None,
            status: None,
            error: Some(error.to_string()),
        }
    }
}

/// Issue counts keyed by severity label, all four levels always present.
pub fn issue_breakdown<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> BTreeMap<String, usize> {
    let mut breakdown: BTreeMap<String, usize> = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ]
    .iter()
    .map(|s| (s.label().to_string(), 0))
    .collect();
    for issue in issues {
        *breakdown.entry(issue.severity.label().to_string()).or_insert(0) += 1;
    }
    breakdown
}

/// Sequential per-artifact loop with a run-scoped memory.
pub struct ArtifactRunner {
    orchestrator: Arc<StageOrchestrator>,
    stages: Vec<StageSpec>,
    memory_max_words: usize,
}

impl ArtifactRunner {
    pub fn new(orchestrator: Arc<StageOrchestrator>, memory_max_words: usize) -> Self {
        Self {
            orchestrator,
            stages: default_stages(),
            memory_max_words,
        }
    }

    /// Analyze one artifact and fold its findings into `memory`.
    ///
    /// The prompt sees only what `memory` held before this call.
    pub async fn analyze(
        &self,
        memory: &mut ProjectMemory,
        artifact: &Artifact,
        format: OutputFormat,
    ) -> AnalysisResult {
        let digest = memory.summarize(self.memory_max_words);
        let memory_context = (!digest.is_empty()).then_some(digest.as_str());

        match self
            .orchestrator
            .run(
                &self.stages,
                artifact,
                format,
                memory_context,
                SessionScope::Fresh,
            )
            .await
        {
            Ok(raw) => {
                memory.record(&artifact.path, &raw.extraction.issues);
                memory.detect_conventions(&raw.context.descriptors());
                let extraction = raw.extraction;
                if extraction.status.is_failure() {
                    tracing::warn!(
                        artifact = %artifact.path,
                        session = %raw.session_id,
                        "No report could be recovered from the stage output"
                    );
                }
                AnalysisResult {
                    file: artifact.path.clone(),
                    success: true,
                    issues: extraction.issues,
                    summary: Some(extraction.summary),
                    status: Some(extraction.status),
                    error: None,
                }
            }
            Err(e) => AnalysisResult::failed(&artifact.path, e),
        }
    }

    /// Analyze every artifact in order with a memory shared across them.
    pub async fn analyze_all(
        &self,
        artifacts: &[Artifact],
        format: OutputFormat,
    ) -> (Vec<AnalysisResult>, ProjectMemory) {
        let mut memory = ProjectMemory::new();
        let mut results = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            results.push(self.analyze(&mut memory, artifact, format).await);
        }
        (results, memory)
    }
}
