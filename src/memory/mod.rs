//! Run-scoped project memory.
//!
//! [`ProjectMemory`] accumulates cross-artifact signals while one run
//! processes its artifacts in order: per-artifact issue histograms, a
//! recurring-issue counter, detected conventions and a component relation
//! graph. The memory is owned by the run and dropped at its end; nothing in
//! it survives into a later run.
//!
//! Updates recorded for artifact *i* are only visible to prompts built for
//! artifacts after *i*, because the workflow reads [`ProjectMemory::summarize`]
//! before running an artifact and records into it afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::parser::ComponentDescriptor;
use crate::review::findings::Issue;
use crate::util::truncate_words;

/// Count at which an issue type is reported as recurring.
pub const RECURRING_THRESHOLD: usize = 3;

/// Fraction of memoized components above which memoization is "heavy".
pub const HEAVY_MEMOIZATION_RATIO: f64 = 0.7;

const REDUX_HOOKS: &[&str] = &["useSelector", "useDispatch"];
const CONTEXT_HOOKS: &[&str] = &["useContext"];

/// Immutable record of one analyzed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub artifact_id: String,
    /// Issue type → count within this artifact.
    pub histogram: BTreeMap<String, usize>,
    pub recorded_at: DateTime<Utc>,
}

impl ArtifactSummary {
    pub fn issue_count(&self) -> usize {
        self.histogram.values().sum()
    }
}

/// Memory-derived signals surfaced in the review summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInsights {
    pub recurring_warning: Option<String>,
    pub conventions: BTreeMap<String, String>,
}

/// Inspectable view of the whole memory.
#[derive(Debug, Clone, Serialize)]
pub struct MemorySnapshot {
    pub files_analyzed: usize,
    pub total_issues_found: usize,
    pub recurring_issues: BTreeMap<String, usize>,
    pub detected_conventions: BTreeMap<String, String>,
    pub component_graph: BTreeMap<String, Vec<String>>,
    pub warning: Option<String>,
}

#[derive(Debug, Default)]
pub struct ProjectMemory {
    analyzed: Vec<ArtifactSummary>,
    recurring: BTreeMap<String, usize>,
    conventions: BTreeMap<String, String>,
    component_graph: BTreeMap<String, Vec<String>>,
    components_seen: usize,
    memoized_seen: usize,
    uses_redux: bool,
    uses_context: bool,
}

impl ProjectMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// True until the first artifact is recorded.
    pub fn is_empty(&self) -> bool {
        self.analyzed.is_empty()
    }

    pub fn analyzed(&self) -> &[ArtifactSummary] {
        &self.analyzed
    }

    pub fn recurring_issues(&self) -> &BTreeMap<String, usize> {
        &self.recurring
    }

    pub fn conventions(&self) -> &BTreeMap<String, String> {
        &self.conventions
    }

    pub fn component_graph(&self) -> &BTreeMap<String, Vec<String>> {
        &self.component_graph
    }

    /// Append a summary for `artifact_id` and fold its issues into the
    /// recurring-issue counter.
    pub fn record(&mut self, artifact_id: &str, issues: &[Issue]) -> &ArtifactSummary {
        let mut histogram = BTreeMap::new();
        for issue in issues {
            *histogram.entry(issue.issue_type().to_string()).or_insert(0) += 1;
        }
        for (kind, n) in &histogram {
            *self.recurring.entry(kind.clone()).or_insert(0) += n;
        }

        self.analyzed.push(ArtifactSummary {
            artifact_id: artifact_id.to_string(),
            histogram,
            recorded_at: Utc::now(),
        });
        &self.analyzed[self.analyzed.len() - 1]
    }

    /// Update convention flags from newly parsed components.
    ///
    /// Detection is cumulative over every component seen in the run:
    /// `memoization = heavy` while more than 70% of components are memoized;
    /// `state_management` is `redux` once any component uses a store
    /// selector/dispatch hook, else `context` once any uses `useContext`.
    pub fn detect_conventions(&mut self, components: &[ComponentDescriptor]) {
        for component in components {
            self.components_seen += 1;
            if component.is_memoized {
                self.memoized_seen += 1;
            }
            self.uses_redux |= component.uses_any_hook(REDUX_HOOKS);
            self.uses_context |= component.uses_any_hook(CONTEXT_HOOKS);

            let edges = self.component_graph.entry(component.name.clone()).or_default();
            for child in &component.children {
                if !edges.contains(child) {
                    edges.push(child.clone());
                }
            }
        }

        let ratio = if self.components_seen == 0 {
            0.0
        } else {
            self.memoized_seen as f64 / self.components_seen as f64
        };
        if ratio > HEAVY_MEMOIZATION_RATIO {
            self.conventions
                .insert("memoization".to_string(), "heavy".to_string());
        } else {
            self.conventions.remove("memoization");
        }

        if self.uses_redux {
            self.conventions
                .insert("state_management".to_string(), "redux".to_string());
        } else if self.uses_context {
            self.conventions
                .insert("state_management".to_string(), "context".to_string());
        }
    }

    /// Warning naming every issue type seen at least three times in the run.
    pub fn recurring_warning(&self) -> Option<String> {
        let frequent: Vec<String> = self
            .recurring
            .iter()
            .filter(|&(_, &count)| count >= RECURRING_THRESHOLD)
            .map(|(kind, count)| format!("{} ({}x)", kind, count))
            .collect();

        if frequent.is_empty() {
            return None;
        }
        Some(format!(
            "Recurring issues across files: {}. Consider project-wide lint rules.",
            frequent.join(", ")
        ))
    }

    pub fn insights(&self) -> MemoryInsights {
        MemoryInsights {
            recurring_warning: self.recurring_warning(),
            conventions: self.conventions.clone(),
        }
    }

    /// Natural-language digest of the run so far, at most `max_words` words.
    ///
    /// The digest is injected into the next artifact's prompt, so its length
    /// is bounded regardless of how many artifacts the run covers.
    pub fn summarize(&self, max_words: usize) -> String {
        if self.analyzed.is_empty() || max_words == 0 {
            return String::new();
        }

        let total: usize = self.analyzed.iter().map(ArtifactSummary::issue_count).sum();
        let mut parts = vec![format!(
            "Previously analyzed {} file(s) in this review with {} issue(s) found.",
            self.analyzed.len(),
            total
        )];

        let mut common: Vec<(&String, &usize)> = self.recurring.iter().collect();
        common.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        if !common.is_empty() {
            let listed: Vec<String> = common
                .iter()
                .take(5)
                .map(|(kind, count)| format!("{} ({}x)", kind, count))
                .collect();
            parts.push(format!("Most common issue types: {}.", listed.join(", ")));
        }

        if !self.conventions.is_empty() {
            let listed: Vec<String> = self
                .conventions
                .iter()
                .map(|(k, v)| format!("{} is {}", k.replace('_', " "), v))
                .collect();
            parts.push(format!("Project conventions: {}.", listed.join("; ")));
        }

        if self.recurring_warning().is_some() {
            parts.push(
                "Flag further occurrences of recurring types consistently and mention the pattern."
                    .to_string(),
            );
        }

        truncate_words(&parts.join(" "), max_words)
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            files_analyzed: self.analyzed.len(),
            total_issues_found: self.analyzed.iter().map(ArtifactSummary::issue_count).sum(),
            recurring_issues: self.recurring.clone(),
            detected_conventions: self.conventions.clone(),
            component_graph: self.component_graph.clone(),
            warning: self.recurring_warning(),
        }
    }
}
