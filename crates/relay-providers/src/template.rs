//! Request-body templating.
//!
//! A template is any JSON value. Two placeholders are recognised inside
//! strings:
//!
//! - `{{messages}}` — replaced by the JSON array of messages when it is the
//!   whole string
//! - `{{prompt}}` — the content of the last user message; replaced as a string
//!   when it is the whole value, substituted textually when embedded

use relay_core::Request;
use serde_json::{json, Value};

const MESSAGES: &str = "{{messages}}";
const PROMPT: &str = "{{prompt}}";

/// Template used when a provider configures none: an OpenAI-style body.
pub(crate) fn default_template() -> Value {
    json!({ "messages": MESSAGES })
}

/// Render `template` for `request`. Pure; the template is not modified.
pub(crate) fn render(template: &Value, request: &Request) -> Value {
    let prompt = request.last_user_content().unwrap_or_default();
    render_value(template, request, prompt)
}

fn render_value(value: &Value, request: &Request, prompt: &str) -> Value {
    match value {
        Value::String(s) if s == MESSAGES => {
            serde_json::to_value(request.messages()).unwrap_or(Value::Array(Vec::new()))
        }
        Value::String(s) if s.contains(PROMPT) => Value::String(s.replace(PROMPT, prompt)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render_value(v, request, prompt))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), render_value(v, request, prompt)))
                .collect(),
        ),
        other => other.clone(),
    }
}
