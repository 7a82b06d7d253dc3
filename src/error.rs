//! Error types for the Parker 6K driver.
//!
//! `P6kError` is the single error type returned by every operation in this
//! crate. The variants follow the way a 6K exchange can go wrong:
//!
//! - **`Comms`** / **`Timeout`**: the transport could not carry the exchange.
//! - **`Framing`**: bytes arrived but matched neither reply shape.
//! - **`Protocol`**: the controller answered with an explicit error reply.
//! - **`Decode`**: a reply was well framed but its payload did not parse.
//! - **`Command`**: a multi-step command sequence had at least one failed step.
//! - **`Configuration`** / **`UnknownAxis`**: the request or the setup is invalid.
//!
//! None of these is fatal. Callers report and keep polling; the poller's
//! periodic re-invocation is the only retry.

use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type Result<T> = std::result::Result<T, P6kError>;

/// Primary error type for the Parker 6K driver.
#[derive(Error, Debug)]
pub enum P6kError {
    /// Transport unavailable, or the write/read itself failed.
    ///
    /// **Error Type**: Transient or permanent depending on the link. A closed
    /// TCP socket or unplugged adapter stays failed until reconnected.
    ///
    /// **Recovery Strategy**: Keep polling; the comms flag reports the state.
    #[error("Communication error: {0}")]
    Comms(String),

    /// No reply terminator arrived within the transaction bound.
    #[error("Timed out after {timeout_ms} ms waiting for reply to '{command}'")]
    Timeout {
        /// Command that was written before the read timed out.
        command: String,
        /// The bound that elapsed.
        timeout_ms: u64,
    },

    /// Reply matched neither the error shape nor the normal shape.
    #[error("Malformed reply: {0}")]
    Framing(String),

    /// The controller returned an error reply.
    ///
    /// Holds the controller's error text with the leading marker removed,
    /// e.g. `INVALID COMMAND`.
    #[error("Controller rejected '{command}': {message}")]
    Protocol {
        /// Command that provoked the error reply.
        command: String,
        /// Controller error text.
        message: String,
    },

    /// A reply payload did not tokenize into the expected shape.
    ///
    /// **Error Type**: Usually transient (line noise, partial read).
    ///
    /// **Recovery Strategy**: Leave cached state untouched and wait for the
    /// next poll. Stale-but-valid state is preferred to a corrupt read.
    #[error("Could not decode reply '{reply}': {reason}")]
    Decode {
        /// Payload that failed to decode.
        reply: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A command sequence completed with failed steps.
    ///
    /// Earlier steps may have been applied by the controller. Nothing is rolled
    /// back; the first failure text is cached on the axis for observability.
    #[error("{operation} failed on axis {axis}: {failed} of {attempted} steps failed (first: {first_failure})")]
    Command {
        /// Name of the logical operation (e.g. `move`, `set_position`).
        operation: &'static str,
        /// Axis index, 0 for controller-wide operations.
        axis: u8,
        /// Number of steps attempted.
        attempted: usize,
        /// Number of steps that failed.
        failed: usize,
        /// Description of the first failed step.
        first_failure: String,
    },

    /// Configuration or request is invalid.
    ///
    /// **Error Type**: Permanent until the configuration or the cached axis
    /// parameters are fixed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Axis index was never configured on this controller.
    #[error("Axis {0} is not configured")]
    UnknownAxis(u8),

    /// Standard I/O failure outside a transaction (opening a port, reading a file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl P6kError {
    /// True for the failures that surface from the Transaction Channel and
    /// Response Classifier as a single "exchange failed" signal.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            P6kError::Comms(_)
                | P6kError::Timeout { .. }
                | P6kError::Framing(_)
                | P6kError::Protocol { .. }
        )
    }

    /// Short text suitable for the cached per-axis error string.
    pub fn summary(&self) -> String {
        match self {
            P6kError::Protocol { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
