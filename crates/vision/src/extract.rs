//! Layer extraction from a chat completion response.

use layersplit_core::geometry::NormalizedBox;
use layersplit_core::layers::LayerSpec;
use layersplit_core::providers::ExtractError;
use serde_json::Value;

/// Text of the first choice's message.
pub fn message_content(response: &Value) -> Option<&str> {
    response.pointer("/choices/0/message/content")?.as_str()
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse `{layers: [{content, position: {x1, y1, x2, y2}}]}` out of a
/// completion. Entries without a string `content` or a complete numeric
/// `position` are skipped; a reply without `layers` has zero layers.
pub fn extract_layers(response: &Value) -> Result<Vec<LayerSpec>, ExtractError> {
    let Some(content) = message_content(response) else {
        return Err(ExtractError {
            error: "Response has no message content".to_string(),
            raw_response: response.to_string(),
        });
    };

    let parsed: Value = serde_json::from_str(strip_code_fence(content)).map_err(|e| ExtractError {
        error: format!("Failed to parse response: {e}"),
        raw_response: content.to_string(),
    })?;

    let Some(items) = parsed.get("layers").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    Ok(items.iter().filter_map(layer_from_value).collect())
}

fn layer_from_value(item: &Value) -> Option<LayerSpec> {
    let content = item.get("content")?.as_str()?.to_string();
    let pos = item.get("position")?;
    let coord = |key: &str| pos.get(key).and_then(Value::as_f64);
    Some(LayerSpec {
        content,
        position: NormalizedBox::new(coord("x1")?, coord("y1")?, coord("x2")?, coord("y2")?),
    })
}
