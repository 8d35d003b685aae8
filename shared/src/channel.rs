/*!
Byte channel capability.

The dispatcher and the pusher only ever talk to the wire through
[`ByteChannel`]. The binary provides a serial port implementation; the
[`ScriptedChannel`] here replays a fixed script of bytes, stalls and failures
so framing behaviour can be exercised without hardware.
*/

use crate::error::{Result, SharedError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An already configured, byte-oriented link.
pub trait ByteChannel: Send {
    /// Read until `buf` is full or `timeout` elapses. Returns the number of
    /// bytes read; a timeout is not an error.
    fn read_blocking(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Read whatever is already buffered, up to `buf.len()`, without waiting.
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Queue `buf` for transmission without waiting. Returns the number of
    /// bytes accepted; short writes are the caller's problem.
    fn write_nonblocking(&mut self, buf: &[u8]) -> Result<usize>;

    /// Name of the link, used in log lines
    fn name(&self) -> &str;
}

impl<C: ByteChannel + ?Sized> ByteChannel for Box<C> {
    fn read_blocking(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read_blocking(buf, timeout)
    }

    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_nonblocking(buf)
    }

    fn write_nonblocking(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write_nonblocking(buf)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[derive(Debug, Clone)]
enum Step {
    Byte(u8),
    /// The line goes quiet for longer than any read timeout
    Stall,
    Fail(String),
}

/// Record of every `write_nonblocking` call made on a [`ScriptedChannel`].
///
/// Cloned handles share the same log, so a test can keep one after moving
/// the channel into a dispatcher or pusher.
#[derive(Debug, Clone, Default)]
pub struct WriteLog {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl WriteLog {
    fn push(&self, data: &[u8]) {
        let mut writes = self.writes.lock().unwrap_or_else(|e| e.into_inner());
        writes.push(data.to_vec());
    }

    /// Each write call, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// All written bytes concatenated
    pub fn bytes(&self) -> Vec<u8> {
        self.writes().concat()
    }

    /// Forget everything written so far
    pub fn clear(&self) {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// In-memory channel that replays a script.
///
/// Timeouts are not waited out: a read that runs into a stall marker or the
/// end of the script returns immediately with whatever it collected, which
/// is exactly what a real read would return once its timeout expired.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    name: String,
    script: VecDeque<Step>,
    log: WriteLog,
}

impl ScriptedChannel {
    /// Create an empty scripted channel
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: VecDeque::new(),
            log: WriteLog::default(),
        }
    }

    /// Create a channel that will deliver `bytes` and then go quiet
    pub fn with_bytes(name: impl Into<String>, bytes: &[u8]) -> Self {
        let mut channel = Self::new(name);
        channel.push_bytes(bytes);
        channel
    }

    /// Append bytes to the script
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.script.extend(bytes.iter().copied().map(Step::Byte));
    }

    /// Append a pause longer than any read timeout
    pub fn push_stall(&mut self) {
        self.script.push_back(Step::Stall);
    }

    /// Append a read failure
    pub fn push_failure(&mut self, msg: impl Into<String>) {
        self.script.push_back(Step::Fail(msg.into()));
    }

    /// Number of scripted bytes not yet read
    pub fn pending_bytes(&self) -> usize {
        self.script
            .iter()
            .filter(|step| matches!(step, Step::Byte(_)))
            .count()
    }

    /// Handle on the write log
    pub fn write_log(&self) -> WriteLog {
        self.log.clone()
    }

    fn read_script(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut count = 0;
        while count < buf.len() {
            match self.script.front() {
                Some(Step::Byte(byte)) => {
                    buf[count] = *byte;
                    count += 1;
                    self.script.pop_front();
                }
                Some(Step::Stall) => {
                    self.script.pop_front();
                    break;
                }
                Some(Step::Fail(_)) if count > 0 => break,
                Some(Step::Fail(msg)) => {
                    let err = SharedError::channel(msg.clone());
                    self.script.pop_front();
                    return Err(err);
                }
                None => break,
            }
        }
        Ok(count)
    }
}

impl ByteChannel for ScriptedChannel {
    fn read_blocking(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        self.read_script(buf)
    }

    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.read_script(buf)
    }

    fn write_nonblocking(&mut self, buf: &[u8]) -> Result<usize> {
        self.log.push(buf);
        Ok(buf.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
