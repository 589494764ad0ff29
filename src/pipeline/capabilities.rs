//! Typed capability results and their normalization into issues.
//!
//! Each capability returns its own payload shape. [`CapabilityResult::classify`]
//! maps a payload onto one variant, by capability name first and by shape
//! when the name is unknown. [`CapabilityResult::normalize`] then turns each
//! variant into standard [`Issue`]s.

use serde::Deserialize;
use serde_json::Value;

use crate::review::findings::{Issue, Severity, UNKNOWN_COMPONENT};
use crate::util::humanize;

const RENDER_TRIGGER_TITLE: &str = "Unnecessary re-renders";
const RENDER_TRIGGER_SUGGESTION: &str = "Wrap the component in React.memo and stabilize \
     the props passed to it with useCallback/useMemo so parent renders do not \
     propagate.";

/// Capabilities whose results describe code without carrying findings.
const INFORMATIONAL: &[&str] = &[
    "parse_code",
    "inspect_component",
    "list_components",
    "trace_prop",
    "analyze_state_relationships",
    "format_report",
];

/// Strip a tool-server prefix such as `mcp__react__`.
pub fn capability_name(raw: &str) -> &str {
    if raw.starts_with("mcp__") {
        raw.rsplit("__").next().unwrap_or(raw)
    } else {
        raw
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HookIssue {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HookRecord {
    #[serde(default)]
    pub hook_type: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub issues: Vec<HookIssue>,
}

/// Result of the hook dependency analysis for one component.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HookListing {
    #[serde(default)]
    pub component: Option<String>,
    pub hooks: Vec<HookRecord>,
}

/// Result of the render trigger analysis for one component.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderTriggerReport {
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub is_memoized: Option<bool>,
    #[serde(default)]
    pub triggers: Vec<Value>,
    #[serde(default)]
    pub unnecessary_renders_possible: bool,
    /// Explicit severity when the analyzer supplies one.
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

impl RenderTriggerReport {
    /// Analyzer severity word; derived from the re-render flag when absent.
    pub fn severity_word(&self) -> &str {
        match self.severity.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ if self.unnecessary_renders_possible => "warning",
            _ => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityResult {
    /// A payload with a direct `issues` array.
    Issues {
        component: Option<String>,
        issues: Vec<Value>,
    },
    HookAnalysis(HookListing),
    RenderTriggers(RenderTriggerReport),
    /// Known capability that describes code but reports no findings.
    Informational(Value),
    Unrecognized(Value),
}

impl CapabilityResult {
    pub fn classify(name: &str, payload: &Value) -> Self {
        if !payload.is_object() || payload.get("error").is_some() {
            return Self::Unrecognized(payload.clone());
        }

        let typed = match capability_name(name) {
            "analyze_hook_dependencies" => Self::hook_analysis(payload),
            "analyze_render_triggers" => Self::render_triggers(payload),
            n if INFORMATIONAL.contains(&n) && payload.get("issues").is_none() => {
                return Self::Informational(payload.clone());
            }
            _ => None,
        };

        typed
            .or_else(|| Self::direct_issues(payload))
            .or_else(|| {
                let hooks = payload.get("hooks")?.as_array()?;
                hooks
                    .iter()
                    .any(|h| h.get("issues").is_some())
                    .then(|| Self::hook_analysis(payload))
                    .flatten()
            })
            .or_else(|| {
                payload
                    .get("triggers")
                    .and_then(|_| Self::render_triggers(payload))
            })
            .unwrap_or_else(|| Self::Unrecognized(payload.clone()))
    }

    fn direct_issues(payload: &Value) -> Option<Self> {
        let issues = payload.get("issues")?.as_array()?;
        Some(Self::Issues {
            component: payload
                .get("component")
                .and_then(Value::as_str)
                .map(str::to_string),
            issues: issues.clone(),
        })
    }

    fn hook_analysis(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone())
            .ok()
            .map(Self::HookAnalysis)
    }

    fn render_triggers(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone())
            .ok()
            .map(Self::RenderTriggers)
    }

    /// Normalize into standard issues. `file` fills issues that carry none.
    pub fn normalize(&self, file: &str) -> Vec<Issue> {
        match self {
            Self::Issues { component, issues } => issues
                .iter()
                .filter_map(Issue::from_value)
                .map(|mut issue| {
                    if issue.component == UNKNOWN_COMPONENT {
                        if let Some(c) = component {
                            issue.component = c.clone();
                        }
                    }
                    if issue.has_unknown_file() {
                        issue.file = file.to_string();
                    }
                    issue
                })
                .collect(),
            Self::HookAnalysis(listing) => {
                let component = listing.component.as_deref().unwrap_or(UNKNOWN_COMPONENT);
                listing
                    .hooks
                    .iter()
                    .flat_map(|hook| {
                        hook.issues.iter().map(move |hi| {
                            let severity = if hi.severity.eq_ignore_ascii_case("warning") {
                                Severity::High
                            } else {
                                Severity::Medium
                            };
                            let title = if hi.kind.is_empty() {
                                hook.hook_type
                                    .as_deref()
                                    .map(|h| format!("{} dependency issue", h))
                                    .unwrap_or_else(|| "Hook dependency issue".to_string())
                            } else {
                                humanize(&hi.kind)
                            };
                            let mut issue = Issue::new(file, title)
                                .with_component(component)
                                .with_severity(severity)
                                .with_line(hook.line.unwrap_or(1))
                                .with_problem(hi.message.clone());
                            if !hi.kind.is_empty() {
                                issue = issue.with_kind(hi.kind.clone());
                            }
                            issue
                        })
                    })
                    .collect()
            }
            Self::RenderTriggers(report) => {
                let severity = match Severity::parse_lenient(report.severity_word()) {
                    Some(s) if s >= Severity::High => s,
                    _ => return Vec::new(),
                };
                let component = report.component.as_deref().unwrap_or(UNKNOWN_COMPONENT);
                let memo_note = match report.is_memoized {
                    Some(true) => "is memoized but still",
                    _ => "is not memoized and",
                };
                vec![
                    Issue::new(file, RENDER_TRIGGER_TITLE)
                        .with_component(component)
                        .with_severity(severity)
                        .with_line(report.line.unwrap_or(1))
                        .with_kind("unnecessary_renders")
                        .with_problem(format!(
                            "{} {} re-renders from {} trigger(s), some of which it does not use.",
                            component,
                            memo_note,
                            report.triggers.len()
                        ))
                        .with_suggestion(RENDER_TRIGGER_SUGGESTION),
                ]
            }
            Self::Informational(_) | Self::Unrecognized(_) => Vec::new(),
        }
    }
}
