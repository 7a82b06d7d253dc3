//! Byte-level transports for the 6K link.
//!
//! The controller speaks the same ASCII protocol over RS-232 and Ethernet, so
//! the Transaction Channel only needs raw writes and short, timeout-bounded
//! reads. Anything implementing [`Transport`] can carry a 6K session:
//!
//! - [`SerialTransport`]: `serialport` device (real hardware over RS-232/USB)
//! - [`TcpTransport`]: the 6K Ethernet port
//! - [`crate::mock::MockTransport`]: scripted replies for tests
//!
//! Reads must return `ErrorKind::TimedOut` (or `WouldBlock`) when no byte
//! arrived within the transport's short internal timeout; the channel enforces
//! the overall transaction bound on top of that.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::config::TransportConfig;
use crate::error::{P6kError, Result};

/// Internal read timeout used by the real transports. The channel loops on it
/// until its own deadline.
pub const POLL_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Half-duplex byte transport.
pub trait Transport: Send {
    /// Write every byte of `bytes` and flush.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read available bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Drop any unread input (stale prompts from a previous exchange).
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Human-readable endpoint description for logs.
    fn describe(&self) -> String;
}

/// Type-erased transport.
pub type DynTransport = Box<dyn Transport>;

/// RS-232 link via the `serialport` crate.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    path: String,
}

impl SerialTransport {
    /// Open `path` at `baud_rate`, 8N1, no flow control.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(POLL_READ_TIMEOUT)
            .open()
            .map_err(|e| {
                P6kError::Comms(format!(
                    "Failed to open serial port '{}' at {} baud: {}",
                    path, baud_rate, e
                ))
            })?;

        tracing::debug!(port = path, baud_rate, "Serial port opened");
        Ok(Self {
            port,
            path: path.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn describe(&self) -> String {
        format!("serial:{}", self.path)
    }
}

/// 6K Ethernet link.
pub struct TcpTransport {
    stream: TcpStream,
    address: String,
}

impl TcpTransport {
    /// Connect to `address` (`host:port`).
    pub fn connect(address: &str, connect_timeout: Duration) -> Result<Self> {
        use std::net::ToSocketAddrs;

        let target = address
            .to_socket_addrs()
            .map_err(|e| P6kError::Configuration(format!("Bad address '{}': {}", address, e)))?
            .next()
            .ok_or_else(|| {
                P6kError::Configuration(format!("Address '{}' did not resolve", address))
            })?;

        let stream = TcpStream::connect_timeout(&target, connect_timeout)
            .map_err(|e| P6kError::Comms(format!("Failed to connect to {}: {}", address, e)))?;
        stream.set_read_timeout(Some(POLL_READ_TIMEOUT))?;
        stream.set_nodelay(true)?;

        tracing::debug!(address, "TCP link opened");
        Ok(Self {
            stream,
            address: address.to_string(),
        })
    }
}

impl Transport for TcpTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        let mut scratch = [0u8; 256];
        self.stream.set_nonblocking(true)?;
        let drained = loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        drained
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.address)
    }
}

/// Open the transport named by the configuration.
pub fn open(config: &TransportConfig, timeout: Duration) -> Result<DynTransport> {
    match config {
        TransportConfig::Serial { port, baud_rate } => {
            Ok(Box::new(SerialTransport::open(port, *baud_rate)?))
        }
        TransportConfig::Tcp { address } => Ok(Box::new(TcpTransport::connect(address, timeout)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_serial_port_is_comms_error() {
        let result = SerialTransport::open("/dev/this-port-does-not-exist", 9600);
        assert!(matches!(result, Err(P6kError::Comms(_))));
    }

    #[test]
    fn test_bad_tcp_address_is_configuration_error() {
        let result = TcpTransport::connect("not an address", Duration::from_millis(10));
        assert!(matches!(result, Err(P6kError::Configuration(_))));
    }

    #[test]
    fn test_tcp_round_trip_over_loopback() -> Result<()> {
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?.to_string();
        let server = std::thread::spawn(move || -> io::Result<Vec<u8>> {
            let (mut socket, _) = listener.accept()?;
            let mut buf = [0u8; 16];
            let n = socket.read(&mut buf)?;
            socket.write_all(b"*OK\r\r\n>")?;
            Ok(buf[..n].to_vec())
        });

        let mut link = TcpTransport::connect(&address, Duration::from_secs(1))?;
        link.write_all(b"TSS\n")?;

        let mut received = Vec::new();
        let mut buf = [0u8; 32];
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !received.ends_with(b">") && std::time::Instant::now() < deadline {
            match link.read(&mut buf) {
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
        }

        assert_eq!(received, b"*OK\r\r\n>");
        let sent = server
            .join()
            .map_err(|_| P6kError::Comms("server thread panicked".into()))??;
        assert_eq!(sent, b"TSS\n");
        assert!(link.describe().starts_with("tcp:127.0.0.1:"));
        Ok(())
    }
}
