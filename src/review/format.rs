//! Report rendering for the canonical `{issues, summary}` structure.
//!
//! Each [`OutputFormat`] maps to one [`ReportFormatter`] implementation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;
use crate::review::findings::{Issue, ReportSummary, Severity};

/// Maximum issues listed by the GitHub summary format.
const GITHUB_LIST_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
    Github,
}

impl OutputFormat {
    pub fn formatter(self) -> Box<dyn ReportFormatter> {
        match self {
            Self::Markdown => Box::new(MarkdownFormatter),
            Self::Json => Box::new(JsonFormatter),
            Self::Github => Box::new(GithubFormatter),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Github => "github",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "github" => Ok(Self::Github),
            _ => Err(ConfigError::InvalidFormat(s.to_string())),
        }
    }
}

/// Renders a canonical report into one output format.
pub trait ReportFormatter {
    fn format(&self, issues: &[Issue], summary: &ReportSummary) -> String;
}

pub struct MarkdownFormatter;

impl MarkdownFormatter {
    fn format_issue(issue: &Issue, out: &mut Vec<String>) {
        out.push(format!(
            "### `{}` - {}",
            issue.location(),
            issue.component
        ));
        out.push(format!("**{}**", issue.title));
        out.push(String::new());
        out.push(format!("**Problem:** {}", issue.problem));
        out.push(String::new());
        if let Some(ref impact) = issue.runtime_impact {
            out.push(format!("**Runtime Impact:** {}", impact));
            out.push(String::new());
        }
        out.push("**Suggestion:**".to_string());
        out.push(issue.suggestion.clone());
        out.push(String::new());

        if issue.code_before.is_some() || issue.code_after.is_some() {
            out.push("**Example:**".to_string());
            out.push("```tsx".to_string());
            if let Some(ref before) = issue.code_before {
                out.push(format!("// Before:\n{}", before));
                out.push(String::new());
            }
            if let Some(ref after) = issue.code_after {
                out.push(format!("// After:\n{}", after));
            }
            out.push("```".to_string());
            out.push(String::new());
        }
    }
}

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, issues: &[Issue], summary: &ReportSummary) -> String {
        let by = |s: Severity| issues.iter().filter(move |i| i.severity == s);
        let mut lines = vec![
            "# React Performance Analysis Report".to_string(),
            String::new(),
            "## Summary".to_string(),
            format!("- 🚨 {} critical issues", by(Severity::Critical).count()),
            format!("- ⚠️  {} high-priority issues", by(Severity::High).count()),
            format!("- 💡 {} medium-priority issues", by(Severity::Medium).count()),
            format!("- ℹ️  {} low-priority suggestions", by(Severity::Low).count()),
            String::new(),
        ];

        if let Some(ref warning) = summary.warning {
            lines.push(format!("> {}", warning));
            lines.push(String::new());
        }

        let sections = [
            (Severity::Critical, "## 🚨 Critical Issues"),
            (Severity::High, "## ⚠️  High-Priority Issues"),
            (Severity::Medium, "## 💡 Medium-Priority Issues"),
            (Severity::Low, "## ℹ️  Low-Priority Suggestions"),
        ];
        for (severity, heading) in sections {
            let mut group = by(severity).peekable();
            if group.peek().is_none() {
                continue;
            }
            lines.push(heading.to_string());
            lines.push(String::new());
            for issue in group {
                Self::format_issue(issue, &mut lines);
            }
        }

        lines.join("\n")
    }
}

pub struct JsonFormatter;

impl ReportFormatter for JsonFormatter {
    fn format(&self, issues: &[Issue], summary: &ReportSummary) -> String {
        let value = serde_json::json!({ "issues": issues, "summary": summary });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
    }
}

pub struct GithubFormatter;

impl ReportFormatter for GithubFormatter {
    fn format(&self, issues: &[Issue], _summary: &ReportSummary) -> String {
        let mut lines = vec![
            "## React Performance Analysis".to_string(),
            String::new(),
            format!("Found {} potential performance issues:", issues.len()),
            String::new(),
        ];

        for issue in issues.iter().take(GITHUB_LIST_LIMIT) {
            lines.push(format!(
                "- **{}** ({}): {}",
                issue.component,
                issue.issue_type(),
                if issue.problem.is_empty() { &issue.title } else { &issue.problem }
            ));
        }

        if issues.len() > GITHUB_LIST_LIMIT {
            lines.push(format!(
                "\n... and {} more issues (see detailed report)",
                issues.len() - GITHUB_LIST_LIMIT
            ));
        }

        lines.join("\n")
    }
}
