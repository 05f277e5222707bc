//! End-of-session statistics sent by the sender
//!
//! The summary travels as a reliable frame flagged
//! [`PayloadKind::SessionSummary`](crate::packet::PayloadKind), so receivers
//! route it by frame kind and never by looking at payload bytes. The body is
//! JSON and keeps a `"type": "STATS"` tag for tools that read it directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session summary errors
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Invalid session summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// Discriminator carried in the JSON body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SummaryType {
    #[default]
    #[serde(rename = "STATS")]
    Stats,
}

/// Counts reported by the sender at the end of a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(rename = "type")]
    pub kind: SummaryType,
    pub sent_reliable: u64,
    pub sent_unreliable: u64,
    #[serde(default)]
    pub total_sent: u64,
    /// Sender wall-clock time when the summary was built
    #[serde(default)]
    pub run_ts: f64,
}

impl SessionSummary {
    pub fn new(sent_reliable: u64, sent_unreliable: u64, run_ts: f64) -> Self {
        SessionSummary {
            kind: SummaryType::Stats,
            sent_reliable,
            sent_unreliable,
            total_sent: sent_reliable + sent_unreliable,
            run_ts,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, SummaryError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, SummaryError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
