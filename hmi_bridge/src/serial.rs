/*!
Serial port implementation of [`ByteChannel`].
*/

use anyhow::{Context, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use shared::{ByteChannel, SharedError};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::info;

/// Upper bound for a single blocking write before we give up on the byte
const WRITE_TIMEOUT: Duration = Duration::from_millis(10);

/// An open 8N1 serial port without flow control
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialChannel {
    /// Open `path` at `baud_rate`
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(WRITE_TIMEOUT)
            .open()
            .with_context(|| format!("Failed to open serial port {} at {} baud", path, baud_rate))?;

        info!("🔌 Opened {} at {} baud (8N1)", path, baud_rate);

        Ok(Self {
            port,
            name: path.to_string(),
        })
    }

    fn port_error(&self, e: serialport::Error) -> SharedError {
        SharedError::channel(format!("{}: {}", self.name, e))
    }
}

impl ByteChannel for SerialChannel {
    fn read_blocking(&mut self, buf: &mut [u8], timeout: Duration) -> shared::Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.port
                .set_timeout(remaining)
                .map_err(|e| self.port_error(e))?;

            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Keep what already arrived; the next call reports the fault
                    if filled > 0 {
                        break;
                    }
                    return Err(e.into());
                }
            }
        }

        Ok(filled)
    }

    fn read_nonblocking(&mut self, buf: &mut [u8]) -> shared::Result<usize> {
        let available = self.port.bytes_to_read().map_err(|e| self.port_error(e))? as usize;
        if available == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = available.min(buf.len());
        match self.port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_nonblocking(&mut self, buf: &[u8]) -> shared::Result<usize> {
        self.port
            .set_timeout(WRITE_TIMEOUT)
            .map_err(|e| self.port_error(e))?;

        match self.port.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_fails() {
        let err = SerialChannel::open("/dev/hmi-bridge-does-not-exist", 9600)
            .err()
            .unwrap();
        let message = err.to_string();
        assert!(message.contains("/dev/hmi-bridge-does-not-exist"));
    }
}
