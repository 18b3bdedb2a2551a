//! In-memory serial link for tests and dry runs.
//!
//! The link and its handle share state, so a test can keep the handle,
//! hand the link to a framer, inject controller output, and inspect
//! everything the bridge wrote.

use super::SerialLink;
use crate::firmware::grbl::is_realtime_byte;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockState {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    fail_writes: bool,
    closed: bool,
}

/// Scripted serial link
#[derive(Debug, Default)]
pub struct MockSerialLink {
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle to a [`MockSerialLink`]
#[derive(Debug, Clone)]
pub struct MockLinkHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialLink {
    /// Create a link and the handle that controls it
    pub fn new() -> (Self, MockLinkHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: state.clone(),
            },
            MockLinkHandle { state },
        )
    }
}

impl MockLinkHandle {
    /// Queue bytes as if the controller had sent them
    pub fn push_inbound(&self, data: impl AsRef<[u8]>) {
        self.state.lock().inbound.extend(data.as_ref().iter().copied());
    }

    /// Queue a controller line (LF appended)
    pub fn push_line(&self, line: &str) {
        let mut state = self.state.lock();
        state.inbound.extend(line.bytes());
        state.inbound.push_back(b'\n');
    }

    /// Everything written to the link so far
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Drain and return everything written so far
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().written)
    }

    /// Written bytes split into LF-terminated command lines, skipping
    /// single realtime bytes that carry no terminator
    pub fn written_lines(&self) -> Vec<String> {
        let written = self.written();
        let mut lines = Vec::new();
        let mut current = Vec::new();
        for byte in written {
            match byte {
                b'\n' => lines.push(String::from_utf8_lossy(&std::mem::take(&mut current)).into_owned()),
                b if current.is_empty() && is_realtime_byte(b) => {}
                _ => current.push(byte),
            }
        }
        lines
    }

    /// Make subsequent writes fail with a broken pipe
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Whether the link was closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl SerialLink for MockSerialLink {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        state.written.extend_from_slice(data);
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let n = state.inbound.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn name(&self) -> String {
        "mock".to_string()
    }

    fn close(&mut self) -> io::Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_is_read_in_order() {
        let (mut link, handle) = MockSerialLink::new();
        handle.push_line("ok");

        let mut buf = [0u8; 2];
        assert_eq!(link.read_available(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ok");
        assert_eq!(link.read_available(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'\n');
        assert_eq!(link.read_available(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_written_lines_skip_realtime_bytes() {
        let (mut link, handle) = MockSerialLink::new();
        link.write_all(b"$H\n").unwrap();
        link.write_all(b"?").unwrap();
        link.write_all(&[0x18]).unwrap();
        link.write_all(b"G0 X1\n").unwrap();

        assert_eq!(handle.written_lines(), vec!["$H", "G0 X1"]);
    }
}
