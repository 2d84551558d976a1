//! Mock serial links
//!
//! For tests and simulated devices without hardware. `MockLinkHandle` is the
//! test-side remote for injecting input lines and reading back writes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::error::{IngestionError, Result};
use crate::line::LineAssembler;
use crate::link::{LinkOpener, SerialLink, SerialWrite};

/// Produces reply lines for one written line
pub type Responder = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

#[derive(Default)]
struct Shared {
    inbound: Mutex<Inbound>,
    readable: Condvar,
    written: Mutex<Vec<String>>,
    responder: Mutex<Option<Responder>>,
    closed: AtomicBool,
    fail_writes: AtomicBool,
}

#[derive(Default)]
struct Inbound {
    assembler: LineAssembler,
    lines: VecDeque<String>,
}

impl Shared {
    fn enqueue_bytes(&self, data: &[u8]) {
        let mut inbound = self.inbound.lock().unwrap_or_else(PoisonError::into_inner);
        inbound.assembler.push(data);
        while let Some(line) = inbound.assembler.next_line() {
            inbound.lines.push_back(line);
        }
        drop(inbound);
        self.readable.notify_all();
    }
}

/// Test-side control of a [`MockSerialLink`]
#[derive(Clone, Default)]
pub struct MockLinkHandle {
    shared: Arc<Shared>,
}

impl MockLinkHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one line for the reader (terminator added)
    pub fn push_line(&self, line: &str) {
        self.shared.enqueue_bytes(format!("{line}\r\n").as_bytes());
    }

    /// Queue raw bytes, possibly a partial line
    pub fn push_bytes(&self, data: &[u8]) {
        self.shared.enqueue_bytes(data);
    }

    /// Lines written by the host, terminators stripped
    pub fn written(&self) -> Vec<String> {
        self.shared
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Answer every written line with the responder's output
    pub fn set_responder(&self, responder: Responder) {
        *self
            .shared
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(responder);
    }

    /// Make subsequent writes fail with an I/O error
    pub fn fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// A fresh link over this handle
    pub fn link(&self, port: &str, read_timeout: Duration) -> MockSerialLink {
        self.shared.closed.store(false, Ordering::SeqCst);
        MockSerialLink {
            port_name: port.to_string(),
            read_timeout,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// In-memory [`SerialLink`]
pub struct MockSerialLink {
    port_name: String,
    read_timeout: Duration,
    shared: Arc<Shared>,
}

impl SerialLink for MockSerialLink {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(IngestionError::not_connected(&self.port_name));
        }
        let inbound = self
            .shared
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (mut inbound, _) = self
            .shared
            .readable
            .wait_timeout_while(inbound, self.read_timeout, |i| i.lines.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        Ok(inbound.lines.pop_front())
    }

    fn try_clone_writer(&self) -> Result<Box<dyn SerialWrite>> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(IngestionError::not_connected(&self.port_name));
        }
        Ok(Box::new(MockWriter {
            port_name: self.port_name.clone(),
            shared: Arc::clone(&self.shared),
        }))
    }

    fn close(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.readable.notify_all();
    }
}

struct MockWriter {
    port_name: String,
    shared: Arc<Shared>,
}

impl SerialWrite for MockWriter {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(IngestionError::not_connected(&self.port_name));
        }
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(IngestionError::io(
                &self.port_name,
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "mock write failure"),
            ));
        }

        let text = String::from_utf8_lossy(data);
        let lines: Vec<String> = text
            .split('\n')
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        self.shared
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(lines.iter().cloned());

        let responder = self
            .shared
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(responder) = responder {
            for line in &lines {
                for reply in responder(line) {
                    self.shared.enqueue_bytes(format!("{reply}\r\n").as_bytes());
                }
            }
        }
        Ok(())
    }
}

/// [`LinkOpener`] over registered mock ports
#[derive(Default)]
pub struct MockOpener {
    ports: Mutex<HashMap<String, MockLinkHandle>>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a port and return its control handle
    pub fn add_port(&self, port: &str) -> MockLinkHandle {
        let handle = MockLinkHandle::new();
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(port.to_string(), handle.clone());
        handle
    }

    /// Unregister a port so opening it fails
    pub fn remove_port(&self, port: &str) {
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(port);
    }
}

impl LinkOpener for MockOpener {
    fn open(
        &self,
        port: &str,
        _baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialLink>> {
        let ports = self.ports.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = ports
            .get(port)
            .ok_or_else(|| IngestionError::link_open(port, "no such port"))?;
        Ok(Box::new(handle.link(port, read_timeout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_times_out_without_input() {
        let handle = MockLinkHandle::new();
        let mut link = handle.link("mock0", Duration::from_millis(10));
        assert_eq!(link.read_line().unwrap(), None);
    }

    #[test]
    fn test_partial_bytes_assemble() {
        let handle = MockLinkHandle::new();
        let mut link = handle.link("mock0", Duration::from_millis(10));
        handle.push_bytes(b"*1,2");
        assert_eq!(link.read_line().unwrap(), None);
        handle.push_bytes(b",3@\r\n");
        assert_eq!(link.read_line().unwrap().as_deref(), Some("*1,2,3@"));
    }

    #[test]
    fn test_responder_answers_writes() {
        let handle = MockLinkHandle::new();
        handle.set_responder(Arc::new(|line: &str| vec![format!("ACK {line}")]));
        let mut link = handle.link("mock0", Duration::from_millis(50));
        let mut writer = link.try_clone_writer().unwrap();

        writer.write_all(b"GET,1,0\r\n").unwrap();
        assert_eq!(handle.written(), vec!["GET,1,0".to_string()]);
        assert_eq!(link.read_line().unwrap().as_deref(), Some("ACK GET,1,0"));
    }

    #[test]
    fn test_closed_link_rejects_io() {
        let handle = MockLinkHandle::new();
        let mut link = handle.link("mock0", Duration::from_millis(10));
        let mut writer = link.try_clone_writer().unwrap();
        link.close();
        assert!(handle.is_closed());
        assert!(link.read_line().is_err());
        assert!(writer.write_all(b"x\n").is_err());
    }

    #[test]
    fn test_opener_unknown_port() {
        let opener = MockOpener::new();
        opener.add_port("COM3");
        assert!(opener.open("COM3", 9600, Duration::from_millis(1)).is_ok());
        assert!(opener.open("COM4", 9600, Duration::from_millis(1)).is_err());
    }
}
