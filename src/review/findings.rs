//! Normalized issue types shared by the pipeline, memory and review policy.
//!
//! ## Types
//!
//! - [`Severity`]: critical > high > medium > low
//! - [`Confidence`]: how sure the reasoning stage is about an issue
//! - [`Issue`]: one finding, always carrying a severity and a title
//! - [`ReportSummary`]: per-artifact counts and health
//!
//! ## Example
//!
//! ```
//! use perflens::review::findings::{Issue, Severity};
//!
//! let issue = Issue::new("src/List.tsx", "Inline function breaks memoization")
//!     .with_severity(Severity::High)
//!     .with_line(42)
//!     .with_component("UserList");
//!
//! assert_eq!(issue.location(), "src/List.tsx:42");
//! assert!(issue.severity >= Severity::Medium);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;
use crate::util::humanize;

/// Title used when the upstream stage gave an issue none.
pub const DEFAULT_TITLE: &str = "Performance Issue";

/// Component name used when the upstream stage gave an issue none.
pub const UNKNOWN_COMPONENT: &str = "unknown";

/// Severity level for an issue.
///
/// Ordered so that `Critical > High > Medium > Low`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Marginal improvement.
    #[default]
    Low,
    /// Unnecessary re-renders and similar.
    Medium,
    /// Unstable hook dependencies, broken memoization at scale.
    High,
    /// Noticeable runtime cost; blocks the review.
    Critical,
}

impl Severity {
    /// Numeric rank: critical=3, high=2, medium=1, low=0.
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// Lenient parse of the severity vocabulary used by reasoning stages.
    ///
    /// Besides the four canonical levels this accepts the analyzer's
    /// `warning` / `suggestion` / `info` words. Unknown words yield `None`.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" | "error" => Some(Self::Critical),
            "high" | "warning" => Some(Self::High),
            "medium" | "moderate" => Some(Self::Medium),
            "low" | "suggestion" | "info" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Critical => "🚨",
            Self::High => "⚠️",
            Self::Medium => "💡",
            Self::Low => "ℹ️",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Severity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(ConfigError::InvalidSeverity(s.to_string())),
        }
    }
}

/// Confidence attached to an issue by the reasoning stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl Confidence {
    fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// A single normalized performance issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Path of the artifact, relative to the repository root.
    pub file: String,
    /// 1-based line; never 0.
    pub line: u32,
    pub component: String,
    pub severity: Severity,
    #[serde(default)]
    pub confidence: Confidence,
    pub title: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub suggestion: String,
    /// Machine kind reported by the analyzer (e.g. `unstable_dependency`).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_after: Option<String>,
}

impl Issue {
    /// Create an issue with defaults for everything but file and title.
    pub fn new(file: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: 1,
            component: UNKNOWN_COMPONENT.to_string(),
            severity: Severity::default(),
            confidence: Confidence::default(),
            title: title.into(),
            problem: String::new(),
            suggestion: String::new(),
            kind: None,
            runtime_impact: None,
            code_before: None,
            code_after: None,
        }
    }

    /// Lines below 1 are clamped to 1.
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = line.max(1);
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_problem(mut self, problem: impl Into<String>) -> Self {
        self.problem = problem.into();
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Normalize a loosely-shaped JSON issue from a stage's output.
    ///
    /// Returns `None` only when `value` is not an object. Missing fields are
    /// defaulted: severity to `low`, title to the humanized kind or
    /// [`DEFAULT_TITLE`], component to `unknown`, line to 1.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::trim);
        let non_empty = |key: &str| text(key).filter(|s| !s.is_empty()).map(str::to_string);

        let kind = non_empty("type").or_else(|| non_empty("kind"));
        let title = non_empty("title")
            .or_else(|| kind.as_deref().map(humanize))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let line = obj
            .get("line")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .map(|n| n.clamp(1, u32::MAX as u64) as u32)
            .unwrap_or(1);

        Some(Self {
            file: non_empty("file").unwrap_or_else(|| UNKNOWN_COMPONENT.to_string()),
            line,
            component: non_empty("component").unwrap_or_else(|| UNKNOWN_COMPONENT.to_string()),
            severity: text("severity")
                .and_then(Severity::parse_lenient)
                .unwrap_or_default(),
            confidence: text("confidence")
                .and_then(Confidence::parse_lenient)
                .unwrap_or_default(),
            title,
            problem: non_empty("problem")
                .or_else(|| non_empty("description"))
                .or_else(|| non_empty("message"))
                .unwrap_or_default(),
            suggestion: non_empty("suggestion").unwrap_or_default(),
            kind,
            runtime_impact: non_empty("runtime_impact"),
            code_before: non_empty("code_before"),
            code_after: non_empty("code_after"),
        })
    }

    /// Key used for recurring-issue counting: the analyzer kind when known,
    /// otherwise the title.
    pub fn issue_type(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.title)
    }

    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }

    /// True when the file was never set by the stage output.
    pub fn has_unknown_file(&self) -> bool {
        self.file.is_empty() || self.file == UNKNOWN_COMPONENT
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} ({}): {}",
            self.severity.emoji(),
            self.severity,
            self.location(),
            self.component,
            self.title
        )
    }
}

/// Per-artifact summary accompanying the issue list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    #[serde(default)]
    pub critical_count: usize,
    #[serde(default)]
    pub high_count: usize,
    #[serde(default)]
    pub medium_count: usize,
    #[serde(default)]
    pub low_count: usize,
    #[serde(default)]
    pub files_analyzed: usize,
    #[serde(default)]
    pub components_analyzed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_health: Option<String>,
    /// Status message for degraded extractions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ReportSummary {
    /// Lenient parse of a stage-provided summary; unknown shapes fall back
    /// to the default.
    pub fn from_value(value: Option<&Value>) -> Self {
        value
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Recompute counts from `issues` so the summary never disagrees with
    /// the issue list, filling the component list when the stage gave none.
    pub fn reconcile(mut self, issues: &[Issue]) -> Self {
        self.critical_count = count(issues, Severity::Critical);
        self.high_count = count(issues, Severity::High);
        self.medium_count = count(issues, Severity::Medium);
        self.low_count = count(issues, Severity::Low);
        self.files_analyzed = self.files_analyzed.max(1);
        if self.components_analyzed.is_empty() {
            for issue in issues {
                if issue.component != UNKNOWN_COMPONENT
                    && !self.components_analyzed.contains(&issue.component)
                {
                    self.components_analyzed.push(issue.component.clone());
                }
            }
        }
        self
    }

    pub fn total(&self) -> usize {
        self.critical_count + self.high_count + self.medium_count + self.low_count
    }
}

fn count(issues: &[Issue], severity: Severity) -> usize {
    issues.iter().filter(|i| i.severity == severity).count()
}
