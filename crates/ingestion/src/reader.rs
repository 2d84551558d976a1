//! SerialLinkReader - serial read thread
//!
//! One dedicated thread per link does blocking reads with a timeout and
//! hands every complete line to the subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{Listener, ListenerRegistry, SubscriptionId};
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{IngestionError, Result};
use crate::link::{LinkOpener, SerialLink, SerialWrite};
use crate::metrics::LinkMetrics;

/// Default read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on waiting for the read thread at disconnect
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Backoff after an I/O error
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Shared write half of a connected link
#[derive(Clone)]
pub struct LineWriter {
    link: &'static str,
    inner: Arc<Mutex<Box<dyn SerialWrite>>>,
}

impl LineWriter {
    /// Write `line` followed by CRLF
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut payload = Vec::with_capacity(line.len() + 2);
        payload.extend_from_slice(line.as_bytes());
        payload.extend_from_slice(b"\r\n");

        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&payload)?;
        trace!(link = self.link, line = %line, "Line written");
        Ok(())
    }
}

struct ActiveLink {
    port: String,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
    writer: LineWriter,
}

/// Line-oriented serial reader
///
/// `connect` opens the port and starts the read loop; every complete line is
/// passed to the line listeners on the reader thread.
pub struct SerialLinkReader {
    name: &'static str,
    opener: Arc<dyn LinkOpener>,
    read_timeout: Duration,
    join_timeout: Duration,
    lines: Arc<ListenerRegistry<String>>,
    metrics: Arc<LinkMetrics>,
    active: Mutex<Option<ActiveLink>>,
}

impl SerialLinkReader {
    pub fn new(name: &'static str, opener: Arc<dyn LinkOpener>) -> Self {
        Self {
            name,
            opener,
            read_timeout: DEFAULT_READ_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            lines: Arc::new(ListenerRegistry::new()),
            metrics: Arc::new(LinkMetrics::new(name)),
            active: Mutex::new(None),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Open `port` and start the read loop
    ///
    /// An existing connection is closed first. Open failures are returned to
    /// the caller; there is no retry here.
    #[instrument(name = "link_connect", skip(self), fields(link = self.name))]
    pub fn connect(&self, port: &str, baud_rate: u32) -> Result<()> {
        self.disconnect();

        let mut link = self.opener.open(port, baud_rate, self.read_timeout)?;
        let writer = match link.try_clone_writer() {
            Ok(w) => w,
            Err(e) => {
                link.close();
                return Err(e);
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            let lines = Arc::clone(&self.lines);
            let metrics = Arc::clone(&self.metrics);
            let name = self.name;
            thread::Builder::new()
                .name(format!("{name}-reader"))
                .spawn(move || read_loop(name, link, stop, lines, metrics))
                .map_err(|source| IngestionError::ThreadSpawn {
                    link: name.to_string(),
                    source,
                })?
        };

        *self.lock_active() = Some(ActiveLink {
            port: port.to_string(),
            stop,
            thread,
            writer: LineWriter {
                link: self.name,
                inner: Arc::new(Mutex::new(writer)),
            },
        });

        info!(link = self.name, port = %port, baud_rate, "Link connected");
        Ok(())
    }

    /// Stop the read loop and release the port. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let Some(active) = self.lock_active().take() else {
            return;
        };

        active.stop.store(true, Ordering::Release);

        let deadline = Instant::now() + self.join_timeout;
        while !active.thread.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        if active.thread.is_finished() {
            if active.thread.join().is_err() {
                warn!(link = self.name, "Reader thread panicked");
            }
        } else {
            // the thread owns the port and closes it on exit
            warn!(
                link = self.name,
                timeout_ms = self.join_timeout.as_millis() as u64,
                "Reader thread did not exit in time, detaching"
            );
        }

        info!(link = self.name, port = %active.port, "Link disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|a| !a.thread.is_finished())
    }

    /// Port of the current connection
    pub fn port(&self) -> Option<String> {
        self.lock_active().as_ref().map(|a| a.port.clone())
    }

    /// Register a raw line callback (runs on the reader thread)
    pub fn subscribe_lines(&self, listener: Listener<String>) -> SubscriptionId {
        self.lines.subscribe(listener)
    }

    pub fn unsubscribe_lines(&self, id: SubscriptionId) -> bool {
        self.lines.unsubscribe(id)
    }

    /// Write half of the current connection
    pub fn writer(&self) -> Result<LineWriter> {
        self.lock_active()
            .as_ref()
            .map(|a| a.writer.clone())
            .ok_or_else(|| IngestionError::not_connected(self.name))
    }

    /// Send one line on the current connection
    pub fn write_line(&self, line: &str) -> Result<()> {
        self.writer()?.write_line(line)
    }

    pub fn metrics(&self) -> &Arc<LinkMetrics> {
        &self.metrics
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveLink>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SerialLinkReader {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn read_loop(
    name: &'static str,
    mut link: Box<dyn SerialLink>,
    stop: Arc<AtomicBool>,
    lines: Arc<ListenerRegistry<String>>,
    metrics: Arc<LinkMetrics>,
) {
    debug!(link = name, port = %link.port_name(), "Read loop started");

    while !stop.load(Ordering::Acquire) {
        match link.read_line() {
            Ok(Some(line)) => {
                metrics.record_line();
                trace!(link = name, line = %line, "Line received");
                lines.notify(&line);
            }
            // timeouts are routine
            Ok(None) => {}
            Err(IngestionError::NotConnected { .. }) => {
                warn!(link = name, "Port closed underneath reader, exiting");
                break;
            }
            Err(e) => {
                metrics.record_io_error();
                warn!(link = name, error = %e, "Serial read failed");
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    link.close();
    debug!(link = name, "Read loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockOpener;

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn reader(opener: Arc<MockOpener>) -> SerialLinkReader {
        SerialLinkReader::new("test", opener).with_read_timeout(Duration::from_millis(20))
    }

    #[test]
    fn test_lines_reach_listener() {
        let opener = Arc::new(MockOpener::new());
        let handle = opener.add_port("COM1");
        let reader = reader(Arc::clone(&opener));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        reader.subscribe_lines(Arc::new(move |line: &String| {
            sink.lock().unwrap().push(line.clone());
        }));

        reader.connect("COM1", 9600).unwrap();
        assert!(reader.is_connected());
        handle.push_line("hello");
        handle.push_bytes(b"wor");
        handle.push_bytes(b"ld\n");

        assert!(wait_for(|| seen.lock().unwrap().len() == 2));
        assert_eq!(*seen.lock().unwrap(), vec!["hello", "world"]);
        assert_eq!(reader.metrics().snapshot().lines_received, 2);
    }

    #[test]
    fn test_disconnect_closes_port_and_is_idempotent() {
        let opener = Arc::new(MockOpener::new());
        let handle = opener.add_port("COM1");
        let reader = reader(Arc::clone(&opener));

        reader.connect("COM1", 9600).unwrap();
        reader.disconnect();
        assert!(!reader.is_connected());
        assert!(handle.is_closed());
        reader.disconnect();
        assert!(reader.port().is_none());
    }

    #[test]
    fn test_connect_failure_surfaces() {
        let opener = Arc::new(MockOpener::new());
        let reader = reader(opener);
        let err = reader.connect("COM9", 9600).unwrap_err();
        assert!(matches!(err, IngestionError::LinkOpen { .. }));
        assert!(!reader.is_connected());
    }

    #[test]
    fn test_write_line_appends_crlf() {
        let opener = Arc::new(MockOpener::new());
        let handle = opener.add_port("COM1");
        let reader = reader(Arc::clone(&opener));

        assert!(matches!(
            reader.write_line("GET,1,0"),
            Err(IngestionError::NotConnected { .. })
        ));

        reader.connect("COM1", 115_200).unwrap();
        reader.write_line("GET,1,0").unwrap();
        assert_eq!(handle.written(), vec!["GET,1,0"]);
    }

    #[test]
    fn test_reconnect_replaces_previous_link() {
        let opener = Arc::new(MockOpener::new());
        let first = opener.add_port("COM1");
        let _second = opener.add_port("COM2");
        let reader = reader(Arc::clone(&opener));

        reader.connect("COM1", 9600).unwrap();
        reader.connect("COM2", 9600).unwrap();
        assert!(first.is_closed());
        assert_eq!(reader.port().as_deref(), Some("COM2"));
    }
}
