use serde::Deserialize;
use serde_json::Value;

use crate::util::truncate_str;

/// Events from Claude CLI's stream-json output format
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: String,
    },

    #[serde(rename = "user")]
    User { message: UserMessage },

    #[serde(rename = "result")]
    Result {
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
    },

    #[serde(rename = "system")]
    System { subtype: String },
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        input: Value,
        #[serde(default)]
        id: String,
    },

    #[serde(rename = "text")]
    Text { text: String },

    /// Thinking blocks and anything newer than this decoder.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct UserMessage {
    #[serde(default)]
    pub content: UserContent,
}

/// User turns carry either a plain string or a list of blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Blocks(Vec<UserBlock>),
    Text(String),
}

impl Default for UserContent {
    fn default() -> Self {
        Self::Blocks(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum UserBlock {
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },

    #[serde(other)]
    Other,
}

/// Decode one stream-json line. Blank and undecodable lines yield `None`.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::trace!(error = %e, line = %truncate_str(line, 120), "Skipping stream line");
            None
        }
    }
}

/// Turn tool result content into a structured payload.
///
/// Tool servers return either a JSON string or a list of text blocks whose
/// concatenation is JSON. Content that is not JSON is wrapped as
/// `{"text": ...}` so downstream classification still sees an object.
pub fn tool_result_payload(content: &Value) -> Value {
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        Value::Object(_) => return content.clone(),
        _ => return Value::Null,
    };
    serde_json::from_str(text.trim()).unwrap_or_else(|_| serde_json::json!({ "text": text }))
}

/// Extract a human-readable description from a tool use event
pub fn describe_tool_use(name: &str, input: &Value) -> String {
    let component = input
        .get("component_name")
        .or_else(|| input.get("start_component"))
        .and_then(|v| v.as_str())
        .unwrap_or("component");
    match name.rsplit("__").next().unwrap_or(name) {
        "inspect_component" => format!("Inspecting: {}", component),
        "list_components" => "Listing components".to_string(),
        "trace_prop" => {
            let prop = input.get("prop_name").and_then(|v| v.as_str()).unwrap_or("prop");
            format!("Tracing: {} from {}", prop, component)
        }
        "analyze_render_triggers" => format!("Render triggers: {}", component),
        "analyze_hook_dependencies" => format!("Hook deps: {}", component),
        "analyze_state_relationships" => format!("State: {}", component),
        "analyze_jsx_expressions" => format!("JSX: {}", component),
        "format_report" => "Formatting report".to_string(),
        other => other.to_string(),
    }
}
