//! Batch file plumbing — parse input conversations, render result records.
//!
//! Input is a JSON array whose items are either a plain string (one user
//! message) or a conversation (`[{"role": ..., "content": ...}, ...]`):
//!
//! ```json
//! [
//!   "你好",
//!   [{"role": "system", "content": "be brief"}, {"role": "user", "content": "天气如何"}]
//! ]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use relay_core::{CallOutcome, Request};
use relay_dispatch::BatchResult;

#[derive(Deserialize)]
#[serde(untagged)]
enum InputItem {
    Prompt(String),
    Conversation(Request),
}

/// Parse a batch file's contents.
pub fn parse_batch(text: &str) -> Result<Vec<Request>> {
    let items: Vec<InputItem> = serde_json::from_str(text)
        .context("batch input must be a JSON array of prompts or conversations")?;
    Ok(items
        .into_iter()
        .map(|item| match item {
            InputItem::Prompt(prompt) => Request::from_prompt(prompt),
            InputItem::Conversation(request) => request,
        })
        .collect())
}

/// One output record per input slot.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub index: usize,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultRecord {
    fn new(index: usize, result: &BatchResult) -> Self {
        let mut record = ResultRecord {
            index,
            status: result.status_label(),
            provider: None,
            latency_ms: None,
            response: result.payload().cloned(),
            error: None,
        };
        if let BatchResult::Outcome(outcome) = result {
            record.provider = outcome.provider().map(String::from);
            match outcome {
                CallOutcome::Success { latency, .. } => {
                    record.latency_ms = Some(latency.as_millis() as u64);
                }
                CallOutcome::RateLimited { .. } => {
                    record.error = Some("rate limit exceeded".to_string());
                }
                CallOutcome::Failed { reason, latency, .. } => {
                    record.latency_ms = Some(latency.as_millis() as u64);
                    record.error = Some(reason.to_string());
                }
            }
        }
        record
    }
}

pub fn to_records(results: &[BatchResult]) -> Vec<ResultRecord> {
    results
        .iter()
        .enumerate()
        .map(|(index, result)| ResultRecord::new(index, result))
        .collect()
}
