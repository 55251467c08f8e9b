//! Contract event listener and storage.
//!
//! This crate provides:
//! - A minimal Ethereum JSON-RPC client for logs and block timestamps
//! - Binary search from a timestamp to a block number
//! - SQLite storage for contract events and sync cursors
//! - A polling listener that keeps the store in sync with the chain

pub mod block_search;
pub mod db;
pub mod listener;
pub mod rpc;

pub use block_search::find_block_at_or_after;
pub use db::{EventStore, StoreError};
pub use listener::{EventListener, EventListenerSettings, ListenerError};
pub use rpc::{BlockSource, EventFilter, JsonRpcClient, RpcError};
