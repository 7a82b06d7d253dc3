//! Scripted in-memory 6K for tests and dry runs.
//!
//! `MockTransport` answers each written command from a script:
//! - scripted replies are matched on the exact command text (terminator removed)
//! - several replies for one command are served in order; the last one repeats
//! - unscripted commands get a bare acknowledgement (`\r\n>`)
//!
//! Clones share state, so a test keeps one handle for scripting and
//! verification while the channel owns another.
//!
//! ```
//! use daq_driver_parker6k::mock::MockTransport;
//!
//! let mock = MockTransport::new();
//! mock.value("1TPC", "1TPC1000");
//! mock.error_reply("1V-2", "INVALID DATA FIELD");
//! assert!(mock.calls().is_empty());
//! ```

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::transport::Transport;

/// Delay used to emulate a read that saw no bytes.
const IDLE_READ: Duration = Duration::from_millis(2);

#[derive(Default)]
struct MockState {
    replies: HashMap<String, VecDeque<String>>,
    pending: VecDeque<u8>,
    calls: Vec<String>,
    written: Vec<u8>,
    fail_next: bool,
    silent: bool,
    disconnected: bool,
    chunk_size: Option<usize>,
}

/// Mock 6K transport
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Empty script: every command is acknowledged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a raw reply for `command`. The prompt is appended.
    pub fn reply(&self, command: &str, raw: &str) {
        self.push(command, format!("{}>", raw));
    }

    /// Script a normal reply `*<payload>\r\r\n>` for `command`.
    pub fn value(&self, command: &str, payload: &str) {
        self.push(command, format!("*{}\r\r\n>", payload));
    }

    /// Script an error reply `*<text>?` for `command`.
    pub fn error_reply(&self, command: &str, text: &str) {
        self.push(command, format!("*{}?", text));
    }

    /// Forget every scripted reply for `command`.
    pub fn clear_replies(&self, command: &str) {
        self.state.lock().replies.remove(command);
    }

    /// Fail the next write with an I/O error.
    pub fn trigger_failure(&self) {
        self.state.lock().fail_next = true;
    }

    /// Never answer (forces a channel timeout).
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// Deliver replies at most `size` bytes per read, like a slow serial line.
    /// `None` hands over everything pending.
    pub fn set_chunk_size(&self, size: Option<usize>) {
        self.state.lock().chunk_size = size.map(|n| n.max(1));
    }

    /// Simulate a dropped link: writes fail, reads report end of stream.
    pub fn set_disconnected(&self, disconnected: bool) {
        self.state.lock().disconnected = disconnected;
    }

    /// Commands written so far, terminators removed.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Clear the command log.
    pub fn clear_calls(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.written.clear();
    }

    /// Every byte written so far.
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().written).into_owned()
    }

    fn push(&self, command: &str, raw: String) {
        self.state
            .lock()
            .replies
            .entry(command.to_string())
            .or_default()
            .push_back(raw);
    }
}

impl MockState {
    fn next_reply(&mut self, command: &str) -> String {
        match self.replies.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => "\r\n>".to_string(),
        }
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock link down"));
        }
        if std::mem::take(&mut state.fail_next) {
            return Err(io::Error::new(io::ErrorKind::Other, "mock write failure"));
        }

        state.written.extend_from_slice(bytes);
        let text = String::from_utf8_lossy(bytes);
        for command in text.split('\n').filter(|c| !c.is_empty()) {
            let command = command.trim_end_matches('\r').to_string();
            tracing::trace!(command = %command, "mock received");
            let reply = state.next_reply(&command);
            state.calls.push(command);
            if !state.silent {
                state.pending.extend(reply.bytes());
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Ok(0);
        }
        if state.pending.is_empty() {
            drop(state);
            std::thread::sleep(IDLE_READ);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf
            .len()
            .min(state.pending.len())
            .min(state.chunk_size.unwrap_or(usize::MAX));
        for (slot, byte) in buf.iter_mut().zip(state.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.state.lock().pending.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
