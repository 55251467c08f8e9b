//! Ethereum JSON-RPC access for the event listener.

use async_trait::async_trait;
use chainwatch_core::ContractEvent;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
    #[error("Block not found: {0}")]
    BlockNotFound(u64),
}

/// Which logs to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// Contract address, 0x-prefixed hex.
    pub address: String,
    /// Event signature hash (topic 0). `None` matches every event.
    pub topic: Option<String>,
}

/// Read access to a chain.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Number of the most recent block.
    async fn latest_block(&self) -> Result<u64, RpcError>;

    /// Timestamp (seconds) of a block.
    async fn block_timestamp(&self, number: u64) -> Result<i64, RpcError>;

    /// Logs matching `filter` in the inclusive block range.
    async fn logs(
        &self,
        filter: &EventFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ContractEvent>, RpcError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    transaction_hash: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

impl RawLog {
    /// Pending and reorged-out logs yield `None`.
    fn into_event(self) -> Result<Option<ContractEvent>, RpcError> {
        if self.removed {
            return Ok(None);
        }
        let (Some(block_number), Some(tx_hash), Some(log_index)) =
            (self.block_number, self.transaction_hash, self.log_index)
        else {
            return Ok(None);
        };

        Ok(Some(ContractEvent {
            block_number: parse_quantity(&block_number)?,
            block_timestamp: None,
            tx_hash: tx_hash.to_lowercase(),
            log_index: parse_quantity(&log_index)?,
            address: self.address.to_lowercase(),
            topics: self.topics.into_iter().map(|t| t.to_lowercase()).collect(),
            data: self.data,
        }))
    }
}

/// Parse a hex quantity such as "0x1b4".
pub fn parse_quantity(value: &str) -> Result<u64, RpcError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::InvalidResponse(format!("not a hex quantity: {}", value)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|_| RpcError::InvalidResponse(format!("not a hex quantity: {}", value)))
}

fn to_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

/// JSON-RPC 2.0 client over HTTP.
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Perform a call. A `null` result is returned as `None`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: RpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result)
    }
}

#[async_trait]
impl BlockSource for JsonRpcClient {
    async fn latest_block(&self) -> Result<u64, RpcError> {
        let number: String = self
            .call("eth_blockNumber", json!([]))
            .await?
            .ok_or_else(|| RpcError::InvalidResponse("empty eth_blockNumber".to_string()))?;
        parse_quantity(&number)
    }

    async fn block_timestamp(&self, number: u64) -> Result<i64, RpcError> {
        let block: RawBlock = self
            .call("eth_getBlockByNumber", json!([to_quantity(number), false]))
            .await?
            .ok_or(RpcError::BlockNotFound(number))?;
        Ok(parse_quantity(&block.timestamp)? as i64)
    }

    async fn logs(
        &self,
        filter: &EventFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ContractEvent>, RpcError> {
        let mut params = json!({
            "address": filter.address,
            "fromBlock": to_quantity(from_block),
            "toBlock": to_quantity(to_block),
        });
        if let Some(topic) = &filter.topic {
            params["topics"] = json!([topic]);
        }

        let raw: Vec<RawLog> = self
            .call("eth_getLogs", json!([params]))
            .await?
            .unwrap_or_default();

        let mut events = Vec::with_capacity(raw.len());
        for log in raw {
            if let Some(event) = log.into_event()? {
                events.push(event);
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert!(parse_quantity("1b4").is_err());
        assert!(parse_quantity("0xzz").is_err());
        assert_eq!(to_quantity(436), "0x1b4");
    }

    #[test]
    fn test_raw_log_conversion() {
        let raw: RawLog = serde_json::from_value(json!({
            "address": "0xAbCd000000000000000000000000000000000001",
            "topics": ["0xDDF2"],
            "data": "0x01",
            "blockNumber": "0x10",
            "transactionHash": "0xABC",
            "logIndex": "0x2",
            "removed": false
        }))
        .unwrap();

        let event = raw.into_event().unwrap().unwrap();
        assert_eq!(
            event,
            ContractEvent {
                block_number: 16,
                block_timestamp: None,
                tx_hash: "0xabc".to_string(),
                log_index: 2,
                address: "0xabcd000000000000000000000000000000000001".to_string(),
                topics: vec!["0xddf2".to_string()],
                data: "0x01".to_string(),
            }
        );
    }

    #[test]
    fn test_pending_and_removed_logs_skipped() {
        let pending: RawLog = serde_json::from_value(json!({
            "address": "0x01",
            "topics": [],
            "data": "0x",
            "blockNumber": null,
            "transactionHash": null,
            "logIndex": null
        }))
        .unwrap();
        assert!(pending.into_event().unwrap().is_none());

        let removed: RawLog = serde_json::from_value(json!({
            "address": "0x01",
            "topics": [],
            "data": "0x",
            "blockNumber": "0x1",
            "transactionHash": "0x2",
            "logIndex": "0x0",
            "removed": true
        }))
        .unwrap();
        assert!(removed.into_event().unwrap().is_none());
    }

    #[test]
    fn test_rpc_response_error() {
        let response: RpcResponse<String> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32005, "message": "query returned more than 10000 results"}
        }))
        .unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32005);
    }
}
