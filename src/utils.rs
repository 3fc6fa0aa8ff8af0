//! Formatting and parsing helpers shared by status reporting and the API

use regex::Regex;
use std::sync::LazyLock;

use crate::types::ChatRef;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

static MESSAGE_LINK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:t\.me|telegram\.me|telegram\.dog)/(c/)?([A-Za-z0-9_]+)/(\d+)/?$",
    )
    .ok()
});

/// Format a byte count with two decimals and a binary unit, e.g. `1.50 MB`
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", SIZE_UNITS[unit])
}

/// Format whole seconds as `1d 2h 3m 4s`, omitting zero parts
pub fn format_duration(total_secs: u64) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

/// Ten-cell progress bar for a percentage
pub fn progress_bar(percent: f32) -> String {
    let filled = ((percent / 10.0).floor() as usize).min(10);
    format!("{}{}", "■".repeat(filled), "□".repeat(10 - filled))
}

/// Parse a public message link into its chat and message id
///
/// Accepts `t.me/<username>/<id>` and private `t.me/c/<internal>/<id>` links;
/// private links map to the `-100`-prefixed channel id.
pub fn parse_message_link(link: &str) -> Option<(ChatRef, i64)> {
    let re = MESSAGE_LINK.as_ref()?;
    let caps = re.captures(link.trim())?;
    let message_id: i64 = caps.get(3)?.as_str().parse().ok()?;
    let chat = caps.get(2)?.as_str();

    let chat_ref = if caps.get(1).is_some() {
        let internal: i64 = chat.parse().ok()?;
        ChatRef::Id(format!("-100{internal}").parse().ok()?)
    } else if let Ok(id) = chat.parse::<i64>() {
        ChatRef::Id(id)
    } else {
        ChatRef::Username(chat.to_string())
    };
    Some((chat_ref, message_id))
}
