//! Shared utility functions for the perflens crate.

/// Find every balanced `{...}` span in `text`.
///
/// One pass with a stack of open braces. Inside an object, braces within
/// JSON string literals are skipped, so a `}` in a description does not
/// close the object early; quotes outside any object are prose. Spans are
/// returned as byte ranges in order of their opening brace.
pub fn balanced_object_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i + 1));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
}

/// Extract the outermost JSON object from text that may contain other content.
pub fn extract_json_object(text: &str) -> Option<String> {
    balanced_object_spans(text)
        .first()
        .map(|&(start, end)| text[start..end].to_string())
}

/// Find the smallest JSON object in `text` that parses and has a top-level
/// field named `field`.
pub fn smallest_object_with_field(text: &str, field: &str) -> Option<serde_json::Value> {
    let needle = format!("\"{}\"", field);
    let mut spans: Vec<(usize, usize)> = balanced_object_spans(text)
        .into_iter()
        .filter(|&(start, end)| text[start..end].contains(&needle))
        .collect();
    spans.sort_by_key(|&(start, end)| end - start);

    spans.into_iter().find_map(|(start, end)| {
        serde_json::from_str::<serde_json::Value>(&text[start..end])
            .ok()
            .filter(|v| v.get(field).is_some())
    })
}

/// Keep at most `max_words` whitespace-separated words of `text`.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turn an identifier like `stale_closure_risk` into `Stale closure risk`.
pub fn humanize(kind: &str) -> String {
    let spaced = kind.replace(['_', '-'], " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Truncate a string on a char boundary, appending an ellipsis when cut.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
