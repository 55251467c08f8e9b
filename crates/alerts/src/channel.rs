//! Notification channel: delivers rendered alert text to a Telegram chat.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
    #[error("Invalid Telegram chat id: {0}")]
    InvalidChatId(String),
}

/// Something that can deliver a preformatted text message.
///
/// `send` never fails loudly: every problem (transport, HTTP status,
/// malformed acknowledgement) is reported as `false`. It does not retry.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Whether credentials are configured. A disabled channel never sends.
    fn is_enabled(&self) -> bool;

    /// Deliver `text`. Returns true on confirmed delivery.
    async fn send(&self, text: &str) -> bool;
}

/// Telegram credentials for one alert component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: String::new(),
            chat_id: String::new(),
        }
    }
}

impl TelegramSettings {
    /// Shared credentials from TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;

        if bot_token.is_empty() || chat_id.is_empty() {
            return None;
        }

        Some(Self {
            enabled: true,
            bot_token,
            chat_id,
        })
    }

    /// Fill blank credentials from `fallback`. `enabled` is kept as is.
    pub fn with_fallback(mut self, fallback: &TelegramSettings) -> Self {
        if self.bot_token.is_empty() {
            self.bot_token = fallback.bot_token.clone();
        }
        if self.chat_id.is_empty() {
            self.chat_id = fallback.chat_id.clone();
        }
        self
    }

    /// Enabled and both credentials present.
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

/// Telegram Bot API client bound to a single chat.
pub struct TelegramChannel {
    target: Option<(Bot, ChatId)>,
}

impl TelegramChannel {
    /// Build a channel from settings. Unconfigured settings yield a
    /// disabled channel; a malformed chat id is an error.
    pub fn new(settings: &TelegramSettings) -> Result<Self, ChannelError> {
        if !settings.is_configured() {
            return Ok(Self::disabled());
        }

        let chat_id: i64 = settings
            .chat_id
            .trim()
            .parse()
            .map_err(|_| ChannelError::InvalidChatId(settings.chat_id.clone()))?;

        Ok(Self {
            target: Some((Bot::new(&settings.bot_token), ChatId(chat_id))),
        })
    }

    /// A channel that drops every message.
    pub fn disabled() -> Self {
        Self { target: None }
    }

    /// Send an HTML message to the configured chat.
    pub async fn send_message(&self, text: &str) -> Result<(), ChannelError> {
        let Some((bot, chat_id)) = &self.target else {
            return Ok(());
        };

        bot.send_message(*chat_id, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    async fn send(&self, text: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match self.send_message(text).await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Telegram send failed");
                false
            }
        }
    }
}
