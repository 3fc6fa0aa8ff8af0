//! Caption rebuilding and inline button parsing for copied messages.

use std::sync::LazyLock;

use regex::Regex;

use crate::platform::{InlineButton, InlineKeyboard, Message};
use crate::utils::human_size;

/// `[label][buttonurl:https://...]`, with a trailing `:same` placing the button on the previous row
static BUTTON_MARKUP: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\[([^\[]+?)\]\[buttonurl:/{0,2}(.+?)(:same)?\]")
        .map_err(|e| tracing::error!(error = %e, "Failed to compile button markup pattern"))
        .ok()
});

/// `{filename}`, `{size}` or `{caption}` in a caption template
static PLACEHOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\{(filename|size|caption)\}")
        .map_err(|e| tracing::error!(error = %e, "Failed to compile caption placeholder pattern"))
        .ok()
});

/// Caption to send with a copied message.
///
/// `None` leaves the platform's copy of the original caption untouched.
/// Messages without media never get a caption. The template understands
/// `{filename}`, `{size}` and `{caption}`; substituted values are inserted
/// verbatim and never expanded again.
pub fn render_caption(template: Option<&str>, message: &Message) -> Option<String> {
    let media = message.media.as_ref()?;
    let template = template?;
    let Some(pattern) = PLACEHOLDER.as_ref() else {
        return Some(template.to_string());
    };

    let original = message.caption.as_deref().unwrap_or_default();
    let file_name = media.file_name.as_deref().unwrap_or_default();
    let size = human_size(media.file_size);

    let rendered = pattern.replace_all(template, |caps: &regex::Captures<'_>| match &caps[1] {
        "filename" => file_name,
        "size" => size.as_str(),
        _ => original,
    });
    Some(rendered.into_owned())
}

/// Parse button markup into keyboard rows; `None` if no button is found
pub fn parse_buttons(markup: &str) -> Option<InlineKeyboard> {
    let pattern = BUTTON_MARKUP.as_ref()?;
    let mut rows: InlineKeyboard = Vec::new();

    for caps in pattern.captures_iter(markup) {
        let button = InlineButton {
            text: caps[1].to_string(),
            url: caps[2].replace(' ', ""),
        };
        match rows.last_mut() {
            Some(row) if caps.get(3).is_some() => row.push(button),
            _ => rows.push(vec![button]),
        }
    }

    (!rows.is_empty()).then_some(rows)
}
