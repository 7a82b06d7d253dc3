//! Response Classifier.
//!
//! Every 6K reply is one of two disjoint shapes:
//!
//! - error: `*<text>?` (bytes before the `*` are ignored)
//! - normal: `*<payload>\r\r\n`, or `*<payload>\r\n` from some firmware
//!
//! The error delimiter is searched first. Error replies never carry the normal
//! terminator, so trimming first would misread them.

use crate::error::{P6kError, Result};

/// Leading marker of every reply payload.
pub const MARKER: char = '*';

/// Trailing delimiter of an error reply.
pub const ERROR_DELIMITER: char = '?';

/// Full normal-reply terminator.
pub const TERMINATOR: &str = "\r\r\n";

/// Fallback normal-reply terminator.
pub const SHORT_TERMINATOR: &str = "\r\n";

/// A classified reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Controller error text, marker and delimiter removed.
    Error(String),
    /// Reply payload, marker and terminator removed.
    Normal(String),
}

impl Frame {
    /// Whether this is an error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }
}

/// Classify a raw reply (prompt already stripped by the channel).
pub fn classify(raw: &str) -> Result<Frame> {
    if let Some(delimiter) = raw.find(ERROR_DELIMITER) {
        let body = &raw[..delimiter];
        return match body.find(MARKER) {
            Some(marker) => Ok(Frame::Error(body[marker + 1..].trim().to_string())),
            None => Err(P6kError::Framing(format!(
                "Error reply without '{}' marker: {:?}",
                MARKER, raw
            ))),
        };
    }

    let end = raw
        .find(TERMINATOR)
        .or_else(|| raw.find(SHORT_TERMINATOR))
        .ok_or_else(|| P6kError::Framing(format!("No reply terminator in {:?}", raw)))?;
    let body = &raw[..end];

    let payload = match body.find(MARKER) {
        Some(marker) => &body[marker + 1..],
        None => body.trim(),
    };
    Ok(Frame::Normal(payload.to_string()))
}
