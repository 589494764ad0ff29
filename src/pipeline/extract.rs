//! Recovery of the canonical `{issues, summary}` payload from a stage stream.
//!
//! The backend is not guaranteed to end with well-formed JSON, so
//! extraction tries progressively looser strategies on the terminal stage's
//! final text and falls back to synthesizing issues from capability results.
//! Extraction never fails: every path ends in an [`Extraction`] whose
//! [`ExtractionStatus`] tells callers which path produced it.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;

use super::capabilities::CapabilityResult;
use super::executor::StageEvent;
use crate::review::findings::{Issue, ReportSummary};
use crate::util::smallest_object_with_field;

static FENCED_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*(\{[\s\S]*?\})\s*```").unwrap());

pub const NO_ISSUES_MESSAGE: &str = "No issues detected";
pub const SYNTHESIZED_MESSAGE: &str =
    "Final report was not parseable; issues were synthesized from analysis results";
pub const EXTRACTION_FAILED_MESSAGE: &str =
    "Extraction failed: no parseable report and no analysis results were produced";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// The terminal response held a canonical payload.
    Parsed,
    /// Issues were rebuilt from capability results.
    Synthesized,
    /// Capability results were present but none carried findings.
    NoIssuesDetected,
    /// Neither a payload nor any capability result was available.
    ExtractionFailed,
}

impl ExtractionStatus {
    pub fn is_failure(self) -> bool {
        self == Self::ExtractionFailed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub issues: Vec<Issue>,
    pub summary: ReportSummary,
    pub status: ExtractionStatus,
}

/// Stateless extractor over a stage event stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultExtractor;

impl ResultExtractor {
    /// Extract issues from `events`. `file` fills issues that name no file.
    pub fn extract(events: &[StageEvent], file: &str) -> Extraction {
        if let Some(payload) = terminal_text(events).and_then(recover_payload) {
            return from_payload(&payload, file);
        }
        synthesize(events, file)
    }
}

/// Final response text of the terminal stage, if it produced one.
///
/// The terminal stage is the stage of the last event. Text from earlier
/// stages is never treated as the canonical payload.
fn terminal_text(events: &[StageEvent]) -> Option<&str> {
    let terminal = events.last()?.stage();
    events.iter().rev().find_map(|e| match e {
        StageEvent::Text {
            stage,
            text,
            final_response: true,
        } if stage == terminal && !text.trim().is_empty() => Some(text.as_str()),
        _ => None,
    })
}

/// Try strict parse, fenced block, fence-line stripping, then the smallest
/// object carrying `issues`.
fn recover_payload(text: &str) -> Option<Value> {
    let text = text.trim();
    let canonical = |v: Value| v.get("issues").is_some_and(Value::is_array).then_some(v);

    if let Some(v) = serde_json::from_str(text).ok().and_then(canonical) {
        return Some(v);
    }

    if let Some(v) = FENCED_OBJECT
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| serde_json::from_str(m.as_str()).ok())
        .and_then(canonical)
    {
        return Some(v);
    }

    if let Some(v) = serde_json::from_str(strip_fence_lines(text))
        .ok()
        .and_then(canonical)
    {
        return Some(v);
    }

    smallest_object_with_field(text, "issues").and_then(canonical)
}

/// Drop one leading ```` ``` ```` line and one trailing fence line.
fn strip_fence_lines(text: &str) -> &str {
    let mut body = text;
    if body.starts_with("```") {
        body = body.split_once('\n').map_or("", |(_, rest)| rest);
    }
    let trimmed = body.trim_end();
    if trimmed.ends_with("```") {
        body = trimmed.rsplit_once('\n').map_or("", |(head, _)| head);
    }
    body.trim()
}

fn from_payload(payload: &Value, file: &str) -> Extraction {
    let issues: Vec<Issue> = payload
        .get("issues")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Issue::from_value).collect())
        .unwrap_or_default();
    let issues = fill_files(issues, file);

    let mut summary = ReportSummary::from_value(payload.get("summary")).reconcile(&issues);
    if issues.is_empty() {
        summary.warning = Some(NO_ISSUES_MESSAGE.to_string());
    }

    Extraction {
        issues,
        summary,
        status: ExtractionStatus::Parsed,
    }
}

/// Merge every capability result into one issue list, without deduplication.
fn synthesize(events: &[StageEvent], file: &str) -> Extraction {
    let mut saw_results = false;
    let mut issues = Vec::new();

    for event in events {
        if let StageEvent::ToolResult {
            capability,
            payload,
            ..
        } = event
        {
            saw_results = true;
            issues.extend(CapabilityResult::classify(capability, payload).normalize(file));
        }
    }

    let issues = fill_files(issues, file);
    let mut summary = ReportSummary::default().reconcile(&issues);
    let status = if !issues.is_empty() {
        summary.warning = Some(SYNTHESIZED_MESSAGE.to_string());
        ExtractionStatus::Synthesized
    } else if saw_results {
        summary.warning = Some(NO_ISSUES_MESSAGE.to_string());
        ExtractionStatus::NoIssuesDetected
    } else {
        summary.files_analyzed = 0;
        summary.warning = Some(EXTRACTION_FAILED_MESSAGE.to_string());
        ExtractionStatus::ExtractionFailed
    };

    tracing::debug!(issues = issues.len(), ?status, "Extraction fell back to capability results");
    Extraction {
        issues,
        summary,
        status,
    }
}

fn fill_files(mut issues: Vec<Issue>, file: &str) -> Vec<Issue> {
    for issue in &mut issues {
        if issue.has_unknown_file() {
            issue.file = file.to_string();
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::findings::Severity;
    use serde_json::json;

    const FILE: &str = "src/App.tsx";

    fn payload(n: usize) -> String {
        let issues: Vec<Value> = (0..n)
            .map(|i| json!({"title": format!("Issue {}", i), "severity": "high", "line": i + 1}))
            .collect();
        json!({"issues": issues, "summary": {"files_analyzed": 1}}).to_string()
    }

    fn report(text: &str) -> Vec<StageEvent> {
        vec![
            StageEvent::text("analyzer", "looking"),
            StageEvent::final_text("reporter", text),
        ]
    }

    #[test]
    fn test_empty_stream_is_extraction_failed() {
        let result = ResultExtractor::extract(&[], FILE);
        assert!(result.issues.is_empty());
        assert_eq!(result.status, ExtractionStatus::ExtractionFailed);
        assert_eq!(
            result.summary.warning.as_deref(),
            Some(EXTRACTION_FAILED_MESSAGE)
        );
    }

    #[test]
    fn test_strict_json() {
        let result = ResultExtractor::extract(&report(&payload(2)), FILE);
        assert_eq!(result.status, ExtractionStatus::Parsed);
        assert_eq!(result.issues.len(), 2);
        assert_eq!(result.issues[0].file, FILE);
        assert_eq!(result.summary.high_count, 2);
    }

    #[test]
    fn test_fenced_json_recovers_all_issues() {
        for n in [0, 1, 5] {
            let text = format!("```json\n{}\n```", payload(n));
            let result = ResultExtractor::extract(&report(&text), FILE);
            assert_eq!(result.status, ExtractionStatus::Parsed);
            assert_eq!(result.issues.len(), n);
        }
    }

    #[test]
    fn test_fenced_json_with_surrounding_prose() {
        let text = format!("Here is the report:\n```\n{}\n```\nDone.", payload(3));
        let result = ResultExtractor::extract(&report(&text), FILE);
        assert_eq!(result.issues.len(), 3);
    }

    #[test]
    fn test_unterminated_fence_is_stripped() {
        let text = format!("```json\n{}", payload(1));
        assert_eq!(ResultExtractor::extract(&report(&text), FILE).issues.len(), 1);
        assert_eq!(strip_fence_lines("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_embedded_object_is_found() {
        let text = format!("I analyzed it. Result: {} Hope this helps!", payload(2));
        let result = ResultExtractor::extract(&report(&text), FILE);
        assert_eq!(result.status, ExtractionStatus::Parsed);
        assert_eq!(result.issues.len(), 2);
    }

    #[test]
    fn test_parsed_empty_payload_is_no_issues() {
        let result = ResultExtractor::extract(&report(r#"{"issues": []}"#), FILE);
        assert_eq!(result.status, ExtractionStatus::Parsed);
        assert_eq!(result.summary.warning.as_deref(), Some(NO_ISSUES_MESSAGE));
    }

    #[test]
    fn test_payload_without_issues_array_falls_through() {
        let events = report(r#"{"issues": "none"}"#);
        let result = ResultExtractor::extract(&events, FILE);
        assert_eq!(result.status, ExtractionStatus::ExtractionFailed);
    }

    #[test]
    fn test_final_text_from_earlier_stage_is_ignored() {
        let events = vec![
            StageEvent::final_text("analyzer", payload(4)),
            StageEvent::text("reporter", "I could not format the report."),
        ];
        let result = ResultExtractor::extract(&events, FILE);
        assert_eq!(result.status, ExtractionStatus::ExtractionFailed);
    }

    #[test]
    fn test_synthesis_from_hooks_and_render_triggers() {
        let events = vec![
            StageEvent::tool_result(
                "analyzer",
                "analyze_hook_dependencies",
                json!({
                    "component": "Feed",
                    "hooks": [{
                        "hook_type": "useEffect",
                        "line": 20,
                        "issues": [
                            {"type": "unstable_dependency", "severity": "warning", "message": "m1"},
                            {"type": "potentially_missing_dependency", "severity": "info", "message": "m2"}
                        ]
                    }]
                }),
            ),
            StageEvent::tool_result(
                "analyzer",
                "analyze_render_triggers",
                json!({"component": "Feed", "severity": "critical", "triggers": [{"type": "prop"}]}),
            ),
            StageEvent::final_text("reporter", "Sorry, something went wrong."),
        ];

        let result = ResultExtractor::extract(&events, FILE);
        assert_eq!(result.status, ExtractionStatus::Synthesized);
        assert_eq!(result.issues.len(), 3);

        let severities: Vec<Severity> = result.issues.iter().map(|i| i.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::High, Severity::Medium, Severity::Critical]
        );
        assert_eq!(result.issues[0].title, "Unstable dependency");
        assert_eq!(result.issues[1].title, "Potentially missing dependency");
        assert_eq!(result.issues[2].title, "Unnecessary re-renders");
        assert!(result.issues.iter().all(|i| i.component == "Feed"));
        assert_eq!(result.summary.critical_count, 1);
    }

    #[test]
    fn test_synthesis_keeps_duplicates() {
        let hooks = json!({
            "component": "A",
            "hooks": [{"line": 3, "issues": [{"type": "x", "severity": "warning"}]}]
        });
        let events = vec![
            StageEvent::tool_result("analyzer", "analyze_hook_dependencies", hooks.clone()),
            StageEvent::tool_result("analyzer", "analyze_hook_dependencies", hooks),
        ];
        assert_eq!(ResultExtractor::extract(&events, FILE).issues.len(), 2);
    }

    #[test]
    fn test_results_without_findings_are_no_issues_detected() {
        let events = vec![StageEvent::tool_result(
            "analyzer",
            "list_components",
            json!({"components": [], "total": 0}),
        )];
        let result = ResultExtractor::extract(&events, FILE);
        assert_eq!(result.status, ExtractionStatus::NoIssuesDetected);
        assert_ne!(result.status, ExtractionStatus::ExtractionFailed);
        assert_eq!(result.summary.warning.as_deref(), Some(NO_ISSUES_MESSAGE));
    }

    #[test]
    fn test_malformed_inputs_never_panic() {
        let inputs = [
            "",
            "{",
            "```json\n{\"issues\": [\n```",
            "}{",
            "{\"issues\": [1, \"two\", null]}",
            "```",
        ];
        for text in inputs {
            let result = ResultExtractor::extract(&report(text), FILE);
            assert!(result.issues.len() <= 3);
        }
    }
}
