//! Shared pieces of the rendered alert text.

use chrono::{DateTime, Utc};

/// Escape text for Telegram HTML parse mode.
pub use teloxide::utils::html::escape as escape_html;

/// Format price with precision based on magnitude. USD gets a `$` prefix,
/// other currencies a suffix.
pub fn format_price(price: f64, vs_currency: &str) -> String {
    let abs_price = price.abs();
    let number = if price == 0.0 {
        "0".to_string()
    } else if abs_price >= 1000.0 {
        format!("{:.2}", price)
    } else if abs_price >= 1.0 {
        format!("{:.4}", price)
    } else if abs_price >= 0.01 {
        format!("{:.6}", price)
    } else {
        format!("{:.8}", price)
    };

    if vs_currency.eq_ignore_ascii_case("usd") {
        format!("${}", number)
    } else {
        format!("{} {}", number, vs_currency.to_uppercase())
    }
}

/// "⏰ 2024-01-01 00:00:00 UTC"
pub fn timestamp_line(timestamp: DateTime<Utc>) -> String {
    format!("⏰ {}", timestamp.format("%Y-%m-%d %H:%M:%S UTC"))
}

/// Turn a free-form name into a hashtag-safe word.
pub fn hashtag(name: &str) -> String {
    let tag: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("#{}", tag)
}

/// Footer of hashtags, e.g. "#health #mainnet".
pub fn footer(domain: &str, scope: &str) -> String {
    format!("{} {}", hashtag(domain), hashtag(scope))
}

/// Human readable duration, e.g. "1h 5m", "42s".
pub fn format_duration(duration: chrono::Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Fixed message used to verify channel connectivity.
pub fn canary_message(domain: &str, host: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "🧪 <b>Test Notification</b>\n\n\
         Alert channel <b>{}</b> on <b>{}</b> is working.\n\n\
         {}\n\
         {}",
        escape_html(domain),
        escape_html(host),
        timestamp_line(timestamp),
        footer(domain, "test")
    )
}
