//! The stage catalogue: parse → analyze → reason → report.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Runs the local source parser; never reaches the reasoning backend.
    Parse,
    Analyze,
    Reason,
    Report,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Analyze => "analyze",
            Self::Reason => "reason",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared operation a stage may invoke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSpec {
    pub kind: StageKind,
    pub name: &'static str,
    pub instruction: &'static str,
    pub capabilities: Vec<Capability>,
}

impl StageSpec {
    pub fn is_local(&self) -> bool {
        self.kind == StageKind::Parse
    }
}

pub const PARSE_CODE: Capability = Capability {
    name: "parse_code",
    description: "Parse React/TypeScript source into component data",
};

pub const ANALYZE_CAPABILITIES: &[Capability] = &[
    Capability {
        name: "inspect_component",
        description: "Props, state, hooks, children and memoization of one component",
    },
    Capability {
        name: "list_components",
        description: "All components in the parsed file with basic metadata",
    },
    Capability {
        name: "trace_prop",
        description: "Follow a prop through the component tree",
    },
    Capability {
        name: "analyze_render_triggers",
        description: "What causes a component to re-render",
    },
    Capability {
        name: "analyze_hook_dependencies",
        description: "Dependency array stability for effect and memo hooks",
    },
    Capability {
        name: "analyze_state_relationships",
        description: "State variables and consolidation opportunities",
    },
    Capability {
        name: "analyze_jsx_expressions",
        description: "Inline JSX expressions that may break memoization",
    },
];

pub const FORMAT_REPORT: Capability = Capability {
    name: "format_report",
    description: "Render the validated issues and summary in the requested format",
};

const PARSE_INSTRUCTION: &str = "\
Parse the provided React code and report which components were found and any \
parsing errors. Keep the response concise.";

const ANALYZE_INSTRUCTION: &str = "\
You are a React performance analysis expert working from parsed component data.

1. Start with list_components to see every component.
2. For each component check render triggers, hook dependency health, state \
design and JSX expressions with the matching tools.
3. Use trace_prop for prop drilling concerns.

Only flag issues with evidence. An inline function is fine when the child is \
not memoized. Include line numbers. Return JSON with an \"issues\" array; each \
issue has type, component, line, description, severity \
(critical|warning|suggestion) and confidence (high|medium|low).";

const REASON_INSTRUCTION: &str = "\
You receive potential performance issues from the analyzer. Validate each one \
in context, drop false positives, assign severity (critical|high|medium|low) \
and confidence (high|medium|low), and give a concrete fix.

Each issue MUST include file, line, component, severity, title, problem and \
suggestion, plus runtime_impact, code_before and code_after where useful. \
Return {\"issues\": [...], \"summary\": {critical_count, high_count, \
medium_count, low_count, files_analyzed, components_analyzed, overall_health}}. \
Filter aggressively.";

const REPORT_INSTRUCTION: &str = "\
Call format_report with the validated issues and summary as a JSON string of \
the form {\"issues\": [...], \"summary\": {...}}. Your final message must be \
that JSON object only, with no explanation before or after it.";

/// The default four-stage sequence.
pub fn default_stages() -> Vec<StageSpec> {
    vec![
        StageSpec {
            kind: StageKind::Parse,
            name: "parser",
            instruction: PARSE_INSTRUCTION,
            capabilities: vec![PARSE_CODE],
        },
        StageSpec {
            kind: StageKind::Analyze,
            name: "analyzer",
            instruction: ANALYZE_INSTRUCTION,
            capabilities: ANALYZE_CAPABILITIES.to_vec(),
        },
        StageSpec {
            kind: StageKind::Reason,
            name: "reasoner",
            instruction: REASON_INSTRUCTION,
            capabilities: Vec::new(),
        },
        StageSpec {
            kind: StageKind::Report,
            name: "reporter",
            instruction: REPORT_INSTRUCTION,
            capabilities: vec![FORMAT_REPORT],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stage_order() {
        let kinds: Vec<StageKind> = default_stages().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Parse,
                StageKind::Analyze,
                StageKind::Reason,
                StageKind::Report
            ]
        );
    }

    #[test]
    fn test_only_parse_is_local() {
        let stages = default_stages();
        assert!(stages[0].is_local());
        assert!(stages[1..].iter().all(|s| !s.is_local()));
    }

    #[test]
    fn test_analyze_advertises_all_capabilities() {
        let stages = default_stages();
        let names: Vec<&str> = stages[1].capabilities.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), 7);
        assert!(names.contains(&"analyze_hook_dependencies"));
        assert!(stages[2].capabilities.is_empty());
    }
}
