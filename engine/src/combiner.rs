//! Input Combiner (§4.3): merges fan-in inputs from multiple predecessors into one input record.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Combines predecessor contributions (sorted by predecessor id, nulls filtered) per the merge
/// rules in §4.3. Deterministic given the predecessor ids.
pub fn combine_inputs(inputs: &HashMap<String, Value>) -> Value {
    let mut ids: Vec<&String> = inputs.keys().collect();
    ids.sort();

    let present: Vec<(&String, &Value)> = ids
        .into_iter()
        .filter_map(|id| inputs.get(id).filter(|v| !v.is_null()).map(|v| (id, v)))
        .collect();

    match present.len() {
        0 => Value::Null,
        1 => present[0].1.clone(),
        _ => merge_many(&present),
    }
}

fn merge_many(present: &[(&String, &Value)]) -> Value {
    let mut json_map = Map::new();
    let mut texts = Vec::new();
    let mut binary_map = Map::new();
    let mut first_error: Option<Value> = None;

    for (id, value) in present {
        match value {
            Value::Object(obj) => {
                let json_contribution = obj.get("json").cloned().unwrap_or_else(|| (*value).clone());
                json_map.insert((*id).clone(), json_contribution);
                if let Some(text) = obj.get("text").and_then(|t| t.as_str()) {
                    texts.push(text.to_string());
                }
                if let Some(binary) = obj.get("binary") {
                    binary_map.insert((*id).clone(), binary.clone());
                }
                if first_error.is_none() {
                    if let Some(error) = obj.get("error") {
                        first_error = Some(error.clone());
                    }
                }
            }
            primitive => {
                // primitive inputs contribute { json: {srcId -> value} }
                json_map.insert((*id).clone(), (*primitive).clone());
            }
        }
    }

    let mut result = Map::new();
    if !json_map.is_empty() {
        result.insert("json".to_string(), Value::Object(json_map));
    }
    if !texts.is_empty() {
        result.insert("text".to_string(), Value::String(texts.join("\n")));
    }
    if !binary_map.is_empty() {
        result.insert("binary".to_string(), Value::Object(binary_map));
    }
    if let Some(error) = first_error {
        result.insert("error".to_string(), error);
    }

    // If only text was produced, wrap as { json: { text: combinedText } }.
    if result.len() == 1 {
        if let Some(text) = result.get("text").cloned() {
            let mut inner = Map::new();
            inner.insert("text".to_string(), text);
            let mut wrapped = Map::new();
            wrapped.insert("json".to_string(), Value::Object(inner));
            return Value::Object(wrapped);
        }
    }

    Value::Object(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_inputs_yields_null() {
        let inputs = HashMap::new();
        assert_eq!(combine_inputs(&inputs), Value::Null);
    }

    #[test]
    fn one_input_is_verbatim() {
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), json!({"json": {"x": 1}}));
        assert_eq!(combine_inputs(&inputs), json!({"json": {"x": 1}}));
    }

    #[test]
    fn nulls_are_filtered_leaving_one_input_verbatim() {
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), Value::Null);
        inputs.insert("b".to_string(), json!("hello"));
        assert_eq!(combine_inputs(&inputs), json!({"json": {"b": "hello"}}));
    }

    #[test]
    fn multiple_object_inputs_merge_by_source_id() {
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), json!({"json": {"v": 1}}));
        inputs.insert("b".to_string(), json!({"json": {"v": 2}}));
        let merged = combine_inputs(&inputs);
        assert_eq!(merged["json"]["a"], json!({"v": 1}));
        assert_eq!(merged["json"]["b"], json!({"v": 2}));
    }

    #[test]
    fn text_only_is_wrapped_under_json() {
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), json!({"text": "hello"}));
        inputs.insert("b".to_string(), json!({"text": "world"}));
        let merged = combine_inputs(&inputs);
        assert_eq!(merged, json!({"json": {"text": "hello\nworld"}}));
    }

    #[test]
    fn first_error_is_preserved() {
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), json!({"json": {"v": 1}, "error": "boom"}));
        inputs.insert("b".to_string(), json!({"json": {"v": 2}}));
        let merged = combine_inputs(&inputs);
        assert_eq!(merged["error"], json!("boom"));
    }

    #[test]
    fn merge_is_deterministic_regardless_of_map_iteration_order() {
        let mut inputs1 = HashMap::new();
        inputs1.insert("a".to_string(), json!({"json": {"v": 1}}));
        inputs1.insert("b".to_string(), json!({"json": {"v": 2}}));
        let mut inputs2 = HashMap::new();
        inputs2.insert("b".to_string(), json!({"json": {"v": 2}}));
        inputs2.insert("a".to_string(), json!({"json": {"v": 1}}));
        assert_eq!(combine_inputs(&inputs1), combine_inputs(&inputs2));
    }
}
