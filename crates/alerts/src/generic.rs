//! Free-form operational alerts and contract event notices.

use crate::alerter::{Alert, Alerter};
use crate::format::{escape_html, footer, timestamp_line};
use crate::throttle::AlertKey;
use chainwatch_core::ContractEvent;
use chrono::{DateTime, Utc};

pub type GenericAlerter = Alerter<GenericAlert>;

pub const DOMAIN: &str = "alert";

#[derive(Debug, Clone, PartialEq)]
pub enum GenericAlertKind {
    Info { title: String, message: String },
    Warning { title: String, message: String },
    Error { title: String, message: String },
    /// A contract event was stored by the listener.
    ContractEvent { event: ContractEvent },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericAlert {
    /// Service or component that raised the alert.
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub kind: GenericAlertKind,
}

impl GenericAlert {
    pub fn new(source: impl Into<String>, timestamp: DateTime<Utc>, kind: GenericAlertKind) -> Self {
        Self {
            source: source.into(),
            timestamp,
            kind,
        }
    }

    pub fn error(source: impl Into<String>, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            source,
            Utc::now(),
            GenericAlertKind::Error {
                title: title.into(),
                message: message.into(),
            },
        )
    }

    pub fn contract_event(source: impl Into<String>, event: ContractEvent) -> Self {
        Self::new(source, Utc::now(), GenericAlertKind::ContractEvent { event })
    }
}

impl Alert for GenericAlert {
    fn key(&self) -> AlertKey {
        let message = match &self.kind {
            // Details often carry error text or counters; the title names the condition.
            GenericAlertKind::Info { title, .. }
            | GenericAlertKind::Warning { title, .. }
            | GenericAlertKind::Error { title, .. } => title.clone(),
            GenericAlertKind::ContractEvent { event } => format!("event {}", event.id()),
        };
        AlertKey::new(&self.source, message)
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn render(&self) -> String {
        let body = match &self.kind {
            GenericAlertKind::Info { title, message } => {
                format!("ℹ️ <b>{}</b>\n\n{}", escape_html(title), escape_html(message))
            }
            GenericAlertKind::Warning { title, message } => {
                format!("⚠️ <b>{}</b>\n\n{}", escape_html(title), escape_html(message))
            }
            GenericAlertKind::Error { title, message } => {
                format!("❌ <b>{}</b>\n\n{}", escape_html(title), escape_html(message))
            }
            GenericAlertKind::ContractEvent { event } => {
                let mut text = format!(
                    "📜 <b>Contract Event</b>\n\n\
                     <b>Contract:</b> <code>{}</code>\n\
                     <b>Block:</b> {}\n\
                     <b>Tx:</b> <code>{}</code>\n\
                     <b>Log index:</b> {}",
                    escape_html(&event.address),
                    event.block_number,
                    escape_html(&event.tx_hash),
                    event.log_index
                );
                if let Some(signature) = event.signature() {
                    text.push_str(&format!(
                        "\n<b>Topic:</b> <code>{}</code>",
                        escape_html(signature)
                    ));
                }
                text
            }
        };

        format!(
            "{}\n\n<b>Source:</b> {}\n{}\n{}",
            body,
            escape_html(&self.source),
            timestamp_line(self.timestamp),
            footer(DOMAIN, &self.source)
        )
    }
}
