//! Variable Resolver (§4.2): substitutes `{{ reference }}` placeholders in node input fields
//! against layered namespaces.

use crate::error::EngineError;
use crate::model::{Checkpoint, ChatMessage};
use regex::Regex;
use serde_json::Value;

/// The namespaces a reference can resolve against, scoped to one node invocation.
pub struct Namespaces<'a> {
    pub question: &'a str,
    pub file_attachment: Option<&'a str>,
    pub chat_history: &'a [ChatMessage],
    pub form: &'a Value,
    pub vars: &'a Value,
    pub flow: &'a Value,
    pub checkpoint: &'a Checkpoint,
}

/// Strips markup introduced by rich-text editors, collapsing tags to nothing and decoding the
/// handful of entities those editors commonly emit.
///
/// Known risk (flagged, not gated): this runs unconditionally before variable substitution and
/// can corrupt non-prose inputs such as regex patterns or URLs containing `<`/`>`-shaped
/// sequences.
pub fn normalize_html_to_text(input: &str) -> String {
    let tag_re = Regex::new(r"<[^>]*>").expect("static regex");
    let without_tags = tag_re.replace_all(input, "");
    without_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn reference_re() -> Regex {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("static regex")
}

fn braces_balanced(s: &str) -> bool {
    s.matches("{{").count() == s.matches("}}").count()
}

/// Dotted-path lookup into a JSON value (`a.b.c`); empty path returns the whole value.
fn dotted_lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolves one `{{ reference }}` body. Returns `None` if the reference does not resolve
/// (caller leaves the literal placeholder in place).
fn resolve_reference(reference: &str, ns: &Namespaces) -> Option<String> {
    let reference = reference.trim();
    if reference == "question" {
        let resolved = match ns.file_attachment {
            Some(content) if !content.is_empty() => format!("{content}\n{}", ns.question),
            _ => ns.question.to_string(),
        };
        return Some(resolved);
    }
    if reference == "file_attachment" {
        return ns.file_attachment.map(|s| s.to_string());
    }
    if reference == "chat_history" {
        let flattened: Vec<String> = ns
            .chat_history
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect();
        return Some(flattened.join("\n"));
    }
    if let Some(path) = reference.strip_prefix("$form.") {
        return dotted_lookup(ns.form, path).map(value_to_text);
    }
    if let Some(path) = reference.strip_prefix("$vars.") {
        return dotted_lookup(ns.vars, path).map(value_to_text);
    }
    if let Some(path) = reference.strip_prefix("$flow.") {
        return dotted_lookup(ns.flow, path).map(value_to_text);
    }
    // Otherwise treat the reference as a node id: look up its checkpoint entry's
    // `output.content`.
    ns.checkpoint
        .iter()
        .find(|entry| entry.node_id == reference)
        .and_then(|entry| entry.data.content.clone())
}

/// Resolves every `{{ reference }}` in `input`, left-to-right. Unresolved references are left in
/// place. A stray backslash immediately preceding a reference (an HTML-to-text artifact) is
/// stripped before lookup.
pub fn resolve_string(input: &str, node_id: &str, ns: &Namespaces) -> Result<String, EngineError> {
    let normalized = normalize_html_to_text(input);
    let normalized = normalized.replace("\\{{", "{{");

    if !braces_balanced(&normalized) {
        return Err(EngineError::Resolve {
            node_id: node_id.to_string(),
            reference: normalized,
        });
    }

    let re = reference_re();
    let mut out = String::with_capacity(normalized.len());
    let mut last_end = 0;
    for caps in re.captures_iter(&normalized) {
        let whole = caps.get(0).unwrap();
        out.push_str(&normalized[last_end..whole.start()]);
        let reference = caps.get(1).unwrap().as_str();
        match resolve_reference(reference, ns) {
            Some(resolved) => out.push_str(&resolved),
            None => out.push_str(whole.as_str()),
        }
        last_end = whole.end();
    }
    out.push_str(&normalized[last_end..]);
    Ok(out)
}

/// Recursively walks a JSON value (array/mapping/scalar), resolving references in every string
/// leaf. Only called for parameters whose declared `acceptVariable` is true.
pub fn resolve_value(value: &Value, node_id: &str, ns: &Namespaces) -> Result<Value, EngineError> {
    match value {
        Value::String(s) => Ok(Value::String(resolve_string(s, node_id, ns)?)),
        Value::Array(items) => {
            let resolved: Result<Vec<Value>, EngineError> = items
                .iter()
                .map(|item| resolve_value(item, node_id, ns))
                .collect();
            Ok(Value::Array(resolved?))
        }
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                resolved.insert(k.clone(), resolve_value(v, node_id, ns)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CheckpointEntry, FlowStatus, NodeOutput};
    use serde_json::json;

    fn empty_namespaces<'a>(checkpoint: &'a Checkpoint, question: &'a str) -> Namespaces<'a> {
        Namespaces {
            question,
            file_attachment: None,
            chat_history: &[],
            form: &Value::Null,
            vars: &Value::Null,
            flow: &Value::Null,
            checkpoint,
        }
    }

    #[test]
    fn unresolved_reference_left_in_place() {
        let checkpoint: Checkpoint = vec![];
        let ns = empty_namespaces(&checkpoint, "hi");
        let resolved = resolve_string("value: {{$vars.missing}}", "n1", &ns).unwrap();
        assert_eq!(resolved, "value: {{$vars.missing}}");
    }

    #[test]
    fn question_reference_resolves() {
        let checkpoint: Checkpoint = vec![];
        let ns = empty_namespaces(&checkpoint, "what time is it");
        let resolved = resolve_string("Q: {{question}}", "n1", &ns).unwrap();
        assert_eq!(resolved, "Q: what time is it");
    }

    #[test]
    fn node_id_reference_resolves_to_checkpoint_content() {
        let checkpoint: Checkpoint = vec![CheckpointEntry {
            node_id: "llm_0".into(),
            node_label: "LLM".into(),
            data: NodeOutput {
                content: Some("hello world".into()),
                ..Default::default()
            },
            previous_node_ids: vec![],
            status: FlowStatus::Finished,
        }];
        let ns = empty_namespaces(&checkpoint, "q");
        let resolved = resolve_string("{{llm_0}}", "n2", &ns).unwrap();
        assert_eq!(resolved, "hello world");
    }

    #[test]
    fn stray_backslash_before_reference_is_stripped() {
        let checkpoint: Checkpoint = vec![CheckpointEntry {
            node_id: "llm_0".into(),
            node_label: "LLM".into(),
            data: NodeOutput {
                content: Some("ok".into()),
                ..Default::default()
            },
            previous_node_ids: vec![],
            status: FlowStatus::Finished,
        }];
        let ns = empty_namespaces(&checkpoint, "q");
        let resolved = resolve_string("\\{{llm_0}}", "n2", &ns).unwrap();
        assert_eq!(resolved, "ok");
    }

    #[test]
    fn dotted_form_path_resolves() {
        let checkpoint: Checkpoint = vec![];
        let form = json!({"city": {"name": "Paris"}});
        let ns = Namespaces {
            question: "q",
            file_attachment: None,
            chat_history: &[],
            form: &form,
            vars: &Value::Null,
            flow: &Value::Null,
            checkpoint: &checkpoint,
        };
        let resolved = resolve_string("{{$form.city.name}}", "n1", &ns).unwrap();
        assert_eq!(resolved, "Paris");
    }

    #[test]
    fn unbalanced_braces_is_resolve_error() {
        let checkpoint: Checkpoint = vec![];
        let ns = empty_namespaces(&checkpoint, "q");
        let err = resolve_string("broken {{never closes", "n1", &ns).unwrap_err();
        assert!(matches!(err, EngineError::Resolve { .. }));
    }

    #[test]
    fn multiple_references_resolved_left_to_right() {
        let checkpoint: Checkpoint = vec![];
        let ns = empty_namespaces(&checkpoint, "world");
        let resolved = resolve_string("hello {{question}} and {{question}} again", "n1", &ns)
            .unwrap();
        assert_eq!(resolved, "hello world and world again");
    }

    #[test]
    fn html_markup_is_stripped_before_substitution() {
        let checkpoint: Checkpoint = vec![];
        let ns = empty_namespaces(&checkpoint, "q");
        let resolved = resolve_string("<p>static &amp; text</p>", "n1", &ns).unwrap();
        assert_eq!(resolved, "static & text");
    }

    #[test]
    fn no_references_is_idempotent() {
        let checkpoint: Checkpoint = vec![];
        let ns = empty_namespaces(&checkpoint, "q");
        let once = resolve_string("plain text, no refs", "n1", &ns).unwrap();
        let twice = resolve_string(&once, "n1", &ns).unwrap();
        assert_eq!(once, twice);
    }
}
