//! Transaction Channel: one write-then-read exchange over the 6K link.
//!
//! A transaction writes `command` followed by a line feed, then reads until the
//! controller's prompt or its error delimiter:
//!
//! ```text
//! -> 1TAS\n
//! <- *1TAS0000_0000_0000_0000_0000_0000_0000_0000\r\r\n>
//! -> 1V-2\n
//! <- *INVALID DATA FIELD\r\n?
//! ```
//!
//! The trailing `>` prompt is stripped here (it is the input terminator of
//! the link); the `?` delimiter is kept so the classifier can recognize the
//! error shape. Watching for `?` while reading makes error replies fail fast
//! instead of running into the read timeout.
//!
//! The channel does not serialize callers. The controller lock held by every
//! top-level entry point is what keeps one transaction outstanding at a time.

use std::io;
use std::time::{Duration, Instant};

use crate::error::{P6kError, Result};
use crate::response::{self, Frame, ERROR_DELIMITER};
use crate::transport::DynTransport;

/// Outbound command terminator.
pub const OUTPUT_TERMINATOR: &str = "\n";

/// Link prompt that ends every successful reply.
pub const PROMPT: u8 = b'>';

/// Default transaction bound.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a single reply.
pub const MAX_REPLY_BYTES: usize = 1024;

/// Controller-wide communications flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommsStatus {
    /// Last exchange reached the controller.
    #[default]
    Ok,
    /// Last exchange failed at the transport level.
    Error,
}

impl CommsStatus {
    /// Integer form published through the parameter cache (0 = OK, 1 = ERROR).
    pub fn as_int(self) -> i64 {
        match self {
            CommsStatus::Ok => 0,
            CommsStatus::Error => 1,
        }
    }
}

/// Blocking request/response channel over a [`crate::transport::Transport`].
pub struct Channel {
    transport: Option<DynTransport>,
    timeout: Duration,
    comms: CommsStatus,
}

impl Channel {
    /// Channel over an open transport.
    pub fn new(transport: DynTransport, timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            timeout,
            comms: CommsStatus::Ok,
        }
    }

    /// Channel with no transport attached. Every transaction fails with `Comms`.
    pub fn disconnected(timeout: Duration) -> Self {
        Self {
            transport: None,
            timeout,
            comms: CommsStatus::Error,
        }
    }

    /// Whether a transport is attached.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Last recorded communications state.
    pub fn comms_status(&self) -> CommsStatus {
        self.comms
    }

    /// Transaction bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Endpoint description, if connected.
    pub fn describe(&self) -> Option<String> {
        self.transport.as_ref().map(|t| t.describe())
    }

    /// Detach and drop the transport.
    pub fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            tracing::debug!(endpoint = %transport.describe(), "Closing 6K link");
        }
        self.comms = CommsStatus::Error;
    }

    /// Write `command` and read one raw reply (prompt stripped).
    ///
    /// Updates the comms flag: `Error` on any transport failure or timeout,
    /// `Ok` once a complete reply was read.
    pub fn transact(&mut self, command: &str) -> Result<String> {
        let result = self.exchange_raw(command);
        self.comms = match &result {
            Ok(_) => CommsStatus::Ok,
            Err(_) => CommsStatus::Error,
        };
        result
    }

    /// Transact and classify. Returns the payload of a normal reply; an error
    /// reply becomes `P6kError::Protocol`.
    pub fn request(&mut self, command: &str) -> Result<String> {
        let raw = self.transact(command)?;
        let frame = response::classify(&raw)?;
        tracing::debug!(command, reply = ?frame, "6K exchange");
        match frame {
            Frame::Normal(payload) => Ok(payload),
            Frame::Error(message) => Err(P6kError::Protocol {
                command: command.to_string(),
                message,
            }),
        }
    }

    fn exchange_raw(&mut self, command: &str) -> Result<String> {
        let timeout = self.timeout;
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| P6kError::Comms("6K link is not connected".into()))?;

        if let Err(e) = transport.discard_input() {
            tracing::debug!(error = %e, "Could not discard stale input");
        }

        let wire = format!("{}{}", command, OUTPUT_TERMINATOR);
        transport
            .write_all(wire.as_bytes())
            .map_err(|e| P6kError::Comms(format!("Write of '{}' failed: {}", command, e)))?;
        tracing::trace!(command, "Sent");

        let mut reply: Vec<u8> = Vec::with_capacity(64);
        let mut buf = [0u8; 128];
        let start = Instant::now();

        loop {
            if start.elapsed() > timeout {
                return Err(P6kError::Timeout {
                    command: command.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            match transport.read(&mut buf) {
                Ok(0) => {
                    return Err(P6kError::Comms(format!(
                        "Link closed while waiting for reply to '{}'",
                        command
                    )))
                }
                Ok(n) => {
                    for &byte in &buf[..n] {
                        if byte == PROMPT {
                            return Ok(String::from_utf8_lossy(&reply).into_owned());
                        }
                        reply.push(byte);
                        if byte == ERROR_DELIMITER as u8 {
                            return Ok(String::from_utf8_lossy(&reply).into_owned());
                        }
                    }
                    if reply.len() > MAX_REPLY_BYTES {
                        return Err(P6kError::Framing(format!(
                            "Reply to '{}' exceeded {} bytes without a terminator",
                            command, MAX_REPLY_BYTES
                        )));
                    }
                }
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::Interrupted =>
                {
                    continue;
                }
                Err(e) => {
                    return Err(P6kError::Comms(format!(
                        "Read after '{}' failed: {}",
                        command, e
                    )))
                }
            }
        }
    }
}
