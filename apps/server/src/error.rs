//! Top-level error type for the binary.

use crate::config::ConfigError;
use chainwatch_alerts::{ChannelError, ThrottleConfigError};
use chainwatch_events::{ListenerError, RpcError, StoreError};
use chainwatch_feeds::FeedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Alert channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("Throttle configuration error: {0}")]
    Throttle(#[from] ThrottleConfigError),
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Event listener error: {0}")]
    Listener(#[from] ListenerError),
    #[error("{0}")]
    Usage(String),
}
