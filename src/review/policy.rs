//! Review decision policy.
//!
//! Turns the issues of one or more analyzed artifacts into a
//! [`ReviewDecision`]: the review event, the inline comments that pass the
//! severity threshold, and the summary body.
//!
//! Decision table (first match wins):
//!
//! | condition                                   | event                          |
//! |---------------------------------------------|--------------------------------|
//! | any critical issue                          | request-changes                |
//! | any high issue and auto-approve off         | comment                        |
//! | anything else                               | approve if auto-approve, else comment |
//!
//! Critical and high counts always cover every issue, not just the ones
//! that pass the threshold.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::memory::MemoryInsights;
use crate::review::findings::{Issue, Severity};

pub const DEFAULT_FOOTER: &str = "React Performance Analyzer";

/// GitHub review event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewEvent {
    Approve,
    RequestChanges,
    Comment,
}

impl ReviewEvent {
    pub fn label(self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::RequestChanges => "REQUEST_CHANGES",
            Self::Comment => "COMMENT",
        }
    }
}

impl fmt::Display for ReviewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An inline review comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub path: String,
    pub line: u32,
    pub body: String,
}

/// The derived review: never persisted, only posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub event: ReviewEvent,
    pub comments: Vec<ReviewComment>,
    pub body: String,
    pub critical_count: usize,
    pub high_count: usize,
}

/// Issues found in one analyzed artifact.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactIssues<'a> {
    pub path: &'a str,
    pub issues: &'a [Issue],
}

#[derive(Debug, Clone)]
pub struct ReviewPolicy {
    threshold: Severity,
    auto_approve: bool,
    footer: String,
}

impl ReviewPolicy {
    pub fn new(threshold: Severity, auto_approve: bool) -> Self {
        Self {
            threshold,
            auto_approve,
            footer: DEFAULT_FOOTER.to_string(),
        }
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = footer.into();
        self
    }

    pub fn threshold(&self) -> Severity {
        self.threshold
    }

    /// Whether `issue` becomes an inline comment.
    pub fn includes(&self, issue: &Issue) -> bool {
        issue.severity.rank() >= self.threshold.rank()
    }

    /// Decide the review for the analyzed artifacts.
    ///
    /// Returns `None` when no artifact was analyzed: no review is produced.
    /// Comments keep artifact order; within an artifact they are ordered by
    /// descending severity, then by line.
    pub fn decide(
        &self,
        issues_by_artifact: &[ArtifactIssues<'_>],
        insights: &MemoryInsights,
    ) -> Option<ReviewDecision> {
        if issues_by_artifact.is_empty() {
            return None;
        }

        let all = || issues_by_artifact.iter().flat_map(|a| a.issues.iter());
        let critical_count = all().filter(|i| i.severity == Severity::Critical).count();
        let high_count = all().filter(|i| i.severity == Severity::High).count();
        let total_issues = all().count();

        let mut comments = Vec::new();
        for artifact in issues_by_artifact {
            let mut included: Vec<&Issue> =
                artifact.issues.iter().filter(|i| self.includes(i)).collect();
            included.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.line.cmp(&b.line)));
            comments.extend(included.into_iter().map(|issue| ReviewComment {
                path: artifact.path.to_string(),
                line: issue.line.max(1),
                body: self.comment_body(issue),
            }));
        }

        let event = if critical_count > 0 {
            ReviewEvent::RequestChanges
        } else if high_count > 0 && !self.auto_approve {
            ReviewEvent::Comment
        } else if self.auto_approve {
            ReviewEvent::Approve
        } else {
            ReviewEvent::Comment
        };

        let body = self.summary_body(
            critical_count,
            high_count,
            comments.len(),
            total_issues,
            insights,
        );

        Some(ReviewDecision {
            event,
            comments,
            body,
            critical_count,
            high_count,
        })
    }

    fn comment_body(&self, issue: &Issue) -> String {
        let mut body = format!(
            "{} **{}** ({})\n\n**Problem:**\n{}\n\n**Suggestion:**\n{}",
            issue.severity.emoji(),
            issue.title,
            issue.severity.label().to_uppercase(),
            issue.problem,
            issue.suggestion,
        );
        if let Some(ref impact) = issue.runtime_impact {
            body.push_str(&format!("\n\n**Runtime Impact:**\n{}", impact));
        }
        body.push_str(&format!("\n\n---\n*{}*", self.footer));
        body
    }

    fn summary_body(
        &self,
        critical_count: usize,
        high_count: usize,
        comment_count: usize,
        total_issues: usize,
        insights: &MemoryInsights,
    ) -> String {
        let mut body = if critical_count > 0 {
            format!(
                "## 🚨 React Performance Review\n\n\
                 **Critical issues found: {critical_count}**\n\n\
                 This PR has {critical_count} critical performance issue(s) that should be addressed.\n\n\
                 **Summary:**\n\
                 - 🚨 Critical: {critical_count}\n\
                 - ⚠️ High: {high_count}\n\
                 - 💡 Total issues: {comment_count}\n\n\
                 Please review the inline comments for details.\n"
            )
        } else if high_count > 0 && !self.auto_approve {
            format!(
                "## ⚠️ React Performance Review\n\n\
                 **High-priority issues found: {high_count}**\n\n\
                 **Summary:**\n\
                 - ⚠️ High: {high_count}\n\
                 - 💡 Total issues: {comment_count}\n\n\
                 Consider addressing these before merging.\n"
            )
        } else if comment_count > 0 || total_issues > 0 {
            format!(
                "## 💡 React Performance Review\n\n\
                 **Minor issues found: {total_issues}**\n\n\
                 These are suggestions that may improve performance. Not blocking.\n"
            )
        } else {
            "## ✅ React Performance Review\n\nNo performance issues detected! Great work! 🎉\n"
                .to_string()
        };

        body.push_str(&insights_section(insights));
        body
    }
}

/// Project-wide insights appended to the review summary, or an empty string.
fn insights_section(insights: &MemoryInsights) -> String {
    if insights.recurring_warning.is_none() && insights.conventions.is_empty() {
        return String::new();
    }

    let mut section = String::from("\n---\n\n### 🧠 Project-Wide Insights\n\n");

    if let Some(ref warning) = insights.recurring_warning {
        section.push_str(&format!("**⚠️ Recurring Pattern Detected:**\n{}\n\n", warning));
        section.push_str("Consider implementing a project-wide solution:\n");
        section.push_str("- Add ESLint rules (e.g., `react-perf/jsx-no-new-function-as-prop`)\n");
        section.push_str("- Create utility hooks (e.g., `useStableCallback`)\n");
        section.push_str("- Team training on React.memo patterns\n\n");
    }

    if !insights.conventions.is_empty() {
        section.push_str("**Detected Conventions:**\n");
        for (key, value) in &insights.conventions {
            section.push_str(&format!("- {}: `{}`\n", title_case(key), value));
        }
    }

    section
}

fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn issue(severity: Severity, line: u32) -> Issue {
        Issue::new("src/A.tsx", format!("{} issue", severity))
            .with_severity(severity)
            .with_line(line)
    }

    fn decide(
        policy: &ReviewPolicy,
        artifacts: &[(&str, Vec<Issue>)],
    ) -> Option<ReviewDecision> {
        let views: Vec<ArtifactIssues<'_>> = artifacts
            .iter()
            .map(|(path, issues)| ArtifactIssues {
                path: *path,
                issues: issues.as_slice(),
            })
            .collect();
        policy.decide(&views, &MemoryInsights::default())
    }

    #[test]
    fn test_no_artifacts_produces_no_review() {
        let policy = ReviewPolicy::new(Severity::Medium, false);
        assert!(decide(&policy, &[]).is_none());
    }

    #[test]
    fn test_threshold_filter_for_every_level() {
        let issues = vec![
            issue(Severity::Low, 1),
            issue(Severity::Medium, 2),
            issue(Severity::High, 3),
            issue(Severity::Critical, 4),
        ];
        for (threshold, expected) in [
            (Severity::Low, 4),
            (Severity::Medium, 3),
            (Severity::High, 2),
            (Severity::Critical, 1),
        ] {
            let policy = ReviewPolicy::new(threshold, false);
            let decision = decide(&policy, &[("src/A.tsx", issues.clone())]).unwrap();
            assert_eq!(decision.comments.len(), expected, "threshold {}", threshold);
            // Counts ignore the threshold.
            assert_eq!(decision.critical_count, 1);
            assert_eq!(decision.high_count, 1);
        }
    }

    #[test]
    fn test_critical_requests_changes() {
        let policy = ReviewPolicy::new(Severity::Medium, true);
        let decision = decide(
            &policy,
            &[("a.tsx", vec![issue(Severity::Critical, 1), issue(Severity::Critical, 2)])],
        )
        .unwrap();
        assert_eq!(decision.event, ReviewEvent::RequestChanges);
        assert!(decision.body.contains("Critical issues found: 2"));
    }

    #[test]
    fn test_high_without_auto_approve_comments() {
        let policy = ReviewPolicy::new(Severity::Medium, false);
        let decision = decide(
            &policy,
            &[("a.tsx", vec![issue(Severity::High, 1); 3])],
        )
        .unwrap();
        assert_eq!(decision.event, ReviewEvent::Comment);
        assert!(decision.body.contains("High-priority issues found: 3"));
    }

    #[test]
    fn test_high_with_auto_approve_approves() {
        let policy = ReviewPolicy::new(Severity::Medium, true);
        let decision = decide(&policy, &[("a.tsx", vec![issue(Severity::High, 1)])]).unwrap();
        assert_eq!(decision.event, ReviewEvent::Approve);
    }

    #[test]
    fn test_clean_run_with_auto_approve_approves() {
        let policy = ReviewPolicy::new(Severity::Medium, true);
        let decision = decide(&policy, &[("a.tsx", vec![])]).unwrap();
        assert_eq!(decision.event, ReviewEvent::Approve);
        assert!(decision.comments.is_empty());
        assert!(decision.body.contains("No performance issues detected"));
    }

    #[test]
    fn test_clean_run_without_auto_approve_comments() {
        let policy = ReviewPolicy::new(Severity::Medium, false);
        let decision = decide(&policy, &[("a.tsx", vec![])]).unwrap();
        assert_eq!(decision.event, ReviewEvent::Comment);
    }

    #[test]
    fn test_minor_issues_below_threshold_are_not_commented() {
        let policy = ReviewPolicy::new(Severity::High, false);
        let decision = decide(&policy, &[("a.tsx", vec![issue(Severity::Low, 1)])]).unwrap();
        assert_eq!(decision.event, ReviewEvent::Comment);
        assert!(decision.comments.is_empty());
        assert!(decision.body.contains("Minor issues found: 1"));
    }

    #[test]
    fn test_comment_order_and_body() {
        let policy = ReviewPolicy::new(Severity::Low, false).with_footer("perflens");
        let decision = decide(
            &policy,
            &[
                ("a.tsx", vec![issue(Severity::Low, 1), issue(Severity::High, 9)]),
                ("b.tsx", vec![issue(Severity::Medium, 3)]),
            ],
        )
        .unwrap();
        let order: Vec<(&str, u32)> = decision
            .comments
            .iter()
            .map(|c| (c.path.as_str(), c.line))
            .collect();
        assert_eq!(order, vec![("a.tsx", 9), ("a.tsx", 1), ("b.tsx", 3)]);
        assert!(decision.comments[0].body.starts_with("⚠️ **high issue** (HIGH)"));
        assert!(decision.comments[0].body.ends_with("*perflens*"));
    }

    #[test]
    fn test_insights_section_appended() {
        let mut conventions = BTreeMap::new();
        conventions.insert("state_management".to_string(), "redux".to_string());
        let insights = MemoryInsights {
            recurring_warning: Some("Recurring issues across files: X (3x).".to_string()),
            conventions,
        };
        let policy = ReviewPolicy::new(Severity::Medium, false);
        let decision = policy
            .decide(
                &[ArtifactIssues {
                    path: "a.tsx",
                    issues: &[],
                }],
                &insights,
            )
            .unwrap();
        assert!(decision.body.contains("### 🧠 Project-Wide Insights"));
        assert!(decision.body.contains("Recurring Pattern Detected"));
        assert!(decision.body.contains("- State Management: `redux`"));
    }

    #[test]
    fn test_event_serializes_in_github_form() {
        let json = serde_json::to_string(&ReviewEvent::RequestChanges).unwrap();
        assert_eq!(json, "\"REQUEST_CHANGES\"");
    }
}
