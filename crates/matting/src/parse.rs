//! Output URL extraction from workflow results.

use serde_json::Value;

/// Find the cutout URL in a workflow result.
///
/// `data` is either an object or a JSON-encoded string of one; the URL is
/// its `output` field. Results carrying an `error` key yield `None`.
pub fn parse_workflow_output(result: &Value) -> Option<String> {
    if result.get("error").is_some() {
        return None;
    }

    let data = result.get("data")?;
    let decoded;
    let data = match data {
        Value::String(s) => {
            decoded = serde_json::from_str::<Value>(s).ok()?;
            &decoded
        }
        other => other,
    };

    data.get("output")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_from_object_data() {
        let r = json!({"code": 0, "data": {"output": "https://cdn/x.png"}});
        assert_eq!(parse_workflow_output(&r).as_deref(), Some("https://cdn/x.png"));
    }

    #[test]
    fn output_from_string_encoded_data() {
        let r = json!({"code": 0, "data": "{\"output\":\"https://cdn/y.png\"}"});
        assert_eq!(parse_workflow_output(&r).as_deref(), Some("https://cdn/y.png"));
    }

    #[test]
    fn none_for_error_or_missing_output() {
        assert!(parse_workflow_output(&json!({"error": "boom", "data": {"output": "u"}})).is_none());
        assert!(parse_workflow_output(&json!({"code": 0})).is_none());
        assert!(parse_workflow_output(&json!({"data": {"other": 1}})).is_none());
        assert!(parse_workflow_output(&json!({"data": "not json"})).is_none());
        assert!(parse_workflow_output(&json!({"data": {"output": ""}})).is_none());
    }
}
