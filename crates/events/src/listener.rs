//! Polling contract event listener.

use crate::block_search::find_block_at_or_after;
use crate::db::{EventStore, StoreError};
use crate::rpc::{BlockSource, EventFilter, RpcError};
use chainwatch_core::ContractEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Event listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventListenerSettings {
    pub enabled: bool,
    pub rpc_url: String,
    pub contract_address: String,
    /// Event signature hash (topic 0). Empty matches every event of the contract.
    pub event_topic: String,
    /// First block to scan when no cursor is stored. Defaults to the
    /// confirmed head at first start.
    pub start_block: Option<u64>,
    /// Maximum blocks per eth_getLogs call.
    pub batch_size: u64,
    /// Blocks behind the head considered final.
    pub confirmations: u64,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    /// Send a generic alert for every newly stored event.
    pub notify: bool,
}

impl Default for EventListenerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: String::new(),
            contract_address: String::new(),
            event_topic: String::new(),
            start_block: None,
            batch_size: 1000,
            confirmations: 3,
            interval_secs: 30,
            timeout_secs: 15,
            notify: true,
        }
    }
}

fn is_hex_of_len(value: &str, len: usize) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|digits| digits.len() == len && digits.chars().all(|c| c.is_ascii_hexdigit()))
}

impl EventListenerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn filter(&self) -> EventFilter {
        EventFilter {
            address: self.contract_address.to_lowercase(),
            topic: if self.event_topic.is_empty() {
                None
            } else {
                Some(self.event_topic.to_lowercase())
            },
        }
    }

    /// Check addresses and numbers. Returns a description of the first problem.
    pub fn validate(&self) -> Result<(), String> {
        if self.rpc_url.is_empty() {
            return Err("events.rpc_url is required".to_string());
        }
        if !is_hex_of_len(&self.contract_address, 40) {
            return Err(format!(
                "events.contract_address is not a 20-byte hex address: {}",
                self.contract_address
            ));
        }
        if !self.event_topic.is_empty() && !is_hex_of_len(&self.event_topic, 64) {
            return Err(format!(
                "events.event_topic is not a 32-byte hex hash: {}",
                self.event_topic
            ));
        }
        if self.batch_size == 0 {
            return Err("events.batch_size must be greater than 0".to_string());
        }
        if self.interval_secs == 0 {
            return Err("events.interval_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Keeps the event store in sync with one contract's logs.
pub struct EventListener<S> {
    source: S,
    store: EventStore,
    filter: EventFilter,
    start_block: Option<u64>,
    batch_size: u64,
    confirmations: u64,
    cursor_key: String,
}

impl<S: BlockSource> EventListener<S> {
    pub fn new(source: S, store: EventStore, settings: &EventListenerSettings) -> Self {
        let filter = settings.filter();
        let cursor_key = format!(
            "cursor:{}:{}",
            filter.address,
            filter.topic.as_deref().unwrap_or("*")
        );

        Self {
            source,
            store,
            filter,
            start_block: settings.start_block,
            batch_size: settings.batch_size.max(1),
            confirmations: settings.confirmations,
            cursor_key,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Scan from the stored cursor up to the confirmed head.
    /// Returns events that were not stored before.
    pub async fn poll(&self) -> Result<Vec<ContractEvent>, ListenerError> {
        let latest = self.source.latest_block().await?;
        let head = latest.saturating_sub(self.confirmations);

        let from = match self.store.get_cursor(&self.cursor_key).await? {
            Some(cursor) => cursor + 1,
            None => self.start_block.unwrap_or(head),
        };

        if from > head {
            debug!(from, head, "No new confirmed blocks");
            return Ok(Vec::new());
        }

        let mut new_events = Vec::new();
        let mut chunk_start = from;
        while chunk_start <= head {
            let chunk_end = chunk_start.saturating_add(self.batch_size - 1).min(head);
            new_events.extend(self.sync_chunk(chunk_start, chunk_end).await?);
            self.store.set_cursor(&self.cursor_key, chunk_end).await?;
            chunk_start = chunk_end + 1;
        }

        if !new_events.is_empty() {
            info!(
                count = new_events.len(),
                from,
                to = head,
                "Stored new contract events"
            );
        }
        Ok(new_events)
    }

    /// Store all events in an inclusive block range without moving the
    /// live cursor. Returns the number of newly stored events.
    pub async fn sync_range(&self, from_block: u64, to_block: u64) -> Result<usize, ListenerError> {
        let mut stored = 0;
        let mut chunk_start = from_block;
        while chunk_start <= to_block {
            let chunk_end = chunk_start.saturating_add(self.batch_size - 1).min(to_block);
            stored += self.sync_chunk(chunk_start, chunk_end).await?.len();
            info!(from = chunk_start, to = chunk_end, stored, "Synced block range");
            chunk_start = chunk_end + 1;
        }
        Ok(stored)
    }

    /// First block at or after `since`.
    pub async fn find_start_block(&self, since: DateTime<Utc>) -> Result<Option<u64>, ListenerError> {
        Ok(find_block_at_or_after(&self.source, since.timestamp()).await?)
    }

    async fn sync_chunk(&self, from_block: u64, to_block: u64) -> Result<Vec<ContractEvent>, ListenerError> {
        let mut events = self.source.logs(&self.filter, from_block, to_block).await?;
        debug!(from_block, to_block, count = events.len(), "Fetched logs");

        let mut timestamps: HashMap<u64, i64> = HashMap::new();
        for event in events.iter_mut().filter(|e| e.block_timestamp.is_none()) {
            let timestamp = match timestamps.get(&event.block_number) {
                Some(ts) => *ts,
                None => {
                    let ts = self.source.block_timestamp(event.block_number).await?;
                    timestamps.insert(event.block_number, ts);
                    ts
                }
            };
            event.block_timestamp = Some(timestamp);
        }

        let inserted = self.store.insert_events(&events).await?;
        Ok(inserted.into_iter().cloned().collect())
    }
}
