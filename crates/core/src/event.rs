//! Contract log events as stored by the event listener.

use serde::{Deserialize, Serialize};

/// A decoded contract log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub block_number: u64,
    /// Block timestamp in seconds, when known.
    pub block_timestamp: Option<i64>,
    /// Transaction hash, 0x-prefixed hex.
    pub tx_hash: String,
    /// Position of the log within its block.
    pub log_index: u64,
    /// Emitting contract address, lowercase 0x-prefixed hex.
    pub address: String,
    /// Indexed topics; topic 0 is the event signature hash.
    pub topics: Vec<String>,
    /// Non-indexed event data, 0x-prefixed hex.
    pub data: String,
}

impl ContractEvent {
    /// Event signature hash (topic 0), if present.
    pub fn signature(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }

    /// Short identifier "<tx_hash>:<log_index>" for logs and alerts.
    pub fn id(&self) -> String {
        format!("{}:{}", self.tx_hash, self.log_index)
    }
}
