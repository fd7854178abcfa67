//! Relay channel-name rules.
//!
//! The media relay only accepts channel names matching
//! `^[a-zA-Z0-9_-]{1,64}$`. Names are generated by the coordinator and
//! re-validated whenever an existing session is reused.

use thiserror::Error;

pub const MAX_CHANNEL_LEN: usize = 64;

fn is_channel_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelNameError {
    #[error("channel name is empty")]
    Empty,
    #[error("channel name exceeds {MAX_CHANNEL_LEN} characters")]
    TooLong,
    #[error("channel name contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Check a channel name, reporting the first violation.
pub fn validate_channel_name(name: &str) -> Result<(), ChannelNameError> {
    if name.is_empty() {
        return Err(ChannelNameError::Empty);
    }
    if name.len() > MAX_CHANNEL_LEN {
        return Err(ChannelNameError::TooLong);
    }
    if let Some(c) = name.chars().find(|c| !is_channel_char(*c)) {
        return Err(ChannelNameError::InvalidChar(c));
    }
    Ok(())
}

pub fn is_valid_channel_name(name: &str) -> bool {
    validate_channel_name(name).is_ok()
}

/// Replace invalid characters with `_` and clip to the maximum length.
/// Returns `None` if nothing usable remains.
pub fn sanitize_channel_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .map(|c| if is_channel_char(c) { c } else { '_' })
        .take(MAX_CHANNEL_LEN)
        .collect();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Channel name for a one-to-one call.
pub fn call_channel(call_id: &str) -> String {
    let compact: String = call_id.chars().filter(|c| *c != '-').collect();
    sanitize_channel_name(&format!("call_{compact}")).unwrap_or_else(|| "call".to_string())
}
