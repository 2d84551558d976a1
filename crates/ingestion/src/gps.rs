//! GPS link service
//!
//! SerialLinkReader + GpsProtocolDecoder. Keeps the latest fix and fans out each `GpsFix`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use contracts::{GpsFix, Listener, ListenerRegistry, SubscriptionId, TimeBase};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::link::LinkOpener;
use crate::metrics::{LinkMetrics, LinkMetricsSnapshot};
use crate::nmea::{verify_checksum, GpsProtocolDecoder};
use crate::reader::SerialLinkReader;
use crate::snapshot::Snapshot;

struct GpsState {
    time_base: TimeBase,
    decoder: Mutex<GpsProtocolDecoder>,
    has_valid_fix: AtomicBool,
    current: Arc<Snapshot<GpsFix>>,
    fixes: ListenerRegistry<GpsFix>,
}

impl GpsState {
    fn handle_line(&self, line: &str, metrics: &LinkMetrics) {
        let timestamp = self.time_base.now();
        let (fix, valid) = {
            let mut decoder = self.decoder.lock().unwrap_or_else(PoisonError::into_inner);
            (decoder.decode(line, timestamp), decoder.has_valid_fix())
        };
        self.has_valid_fix.store(valid, Ordering::Release);

        match fix {
            Some(fix) => {
                metrics.record_decoded();
                debug!(
                    latitude = fix.latitude,
                    longitude = fix.longitude,
                    satellites = ?fix.satellites,
                    "GPS fix"
                );
                self.current.store(fix);
                self.fixes.notify(&fix);
            }
            None => {
                let trimmed = line.trim();
                if trimmed.starts_with('$') && !verify_checksum(trimmed) {
                    metrics.record_parse_error();
                }
            }
        }
    }

    fn reset(&self) {
        self.decoder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        self.has_valid_fix.store(false, Ordering::Release);
        self.current.clear();
    }
}

/// NMEA receiver link
pub struct GpsLink {
    reader: SerialLinkReader,
    state: Arc<GpsState>,
}

impl GpsLink {
    pub fn new(opener: Arc<dyn LinkOpener>, time_base: TimeBase) -> Self {
        Self::with_read_timeout(opener, time_base, crate::reader::DEFAULT_READ_TIMEOUT)
    }

    pub fn with_read_timeout(
        opener: Arc<dyn LinkOpener>,
        time_base: TimeBase,
        read_timeout: Duration,
    ) -> Self {
        let reader = SerialLinkReader::new("gps", opener).with_read_timeout(read_timeout);
        let state = Arc::new(GpsState {
            time_base,
            decoder: Mutex::new(GpsProtocolDecoder::new()),
            has_valid_fix: AtomicBool::new(false),
            current: Arc::new(Snapshot::new()),
            fixes: ListenerRegistry::new(),
        });

        let handler = Arc::clone(&state);
        let metrics = Arc::clone(reader.metrics());
        reader.subscribe_lines(Arc::new(move |line: &String| {
            handler.handle_line(line, &metrics);
        }));

        Self { reader, state }
    }

    #[instrument(name = "gps_connect", skip(self))]
    pub fn connect(&self, port: &str, baud_rate: u32) -> Result<()> {
        self.state.reset();
        self.reader.connect(port, baud_rate)
    }

    /// Close the port and forget the last fix
    pub fn disconnect(&self) {
        self.reader.disconnect();
        self.state.reset();
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_connected()
    }

    /// Most recent valid fix
    pub fn current_location(&self) -> Option<GpsFix> {
        self.state.current.load().map(|fix| *fix)
    }

    pub fn has_valid_fix(&self) -> bool {
        self.state.has_valid_fix.load(Ordering::Acquire)
    }

    /// Shared cell holding the latest fix, for readers on other links
    pub fn location_cell(&self) -> Arc<Snapshot<GpsFix>> {
        Arc::clone(&self.state.current)
    }

    /// Register a fix callback (runs on the GPS reader thread)
    pub fn subscribe(&self, listener: Listener<GpsFix>) -> SubscriptionId {
        self.state.fixes.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.fixes.unsubscribe(id)
    }

    pub fn metrics(&self) -> LinkMetricsSnapshot {
        self.reader.metrics().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockOpener;
    use std::time::Instant;

    const GGA: &str = "$GPGGA,063802.00,3724.41511,N,12643.37321,E,1,07,1.23,42.8,M,25.0,M,,*69";
    const GGA_NO_FIX: &str = "$GPGGA,063803.00,3724.41511,N,12643.37321,E,0,00,99.99,,,,,,*57";

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn link() -> (GpsLink, crate::mock::MockLinkHandle) {
        let opener = Arc::new(MockOpener::new());
        let handle = opener.add_port("gps0");
        let link = GpsLink::with_read_timeout(opener, TimeBase::new(), Duration::from_millis(20));
        (link, handle)
    }

    #[test]
    fn test_fix_updates_location_and_listeners() {
        let (link, handle) = link();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        link.subscribe(Arc::new(move |fix: &GpsFix| {
            sink.lock().unwrap().push(*fix);
        }));

        link.connect("gps0", 9600).unwrap();
        handle.push_line(GGA);

        assert!(wait_for(|| link.current_location().is_some()));
        assert!(link.has_valid_fix());
        let fix = link.current_location().unwrap();
        assert_eq!(fix.satellites, Some(7));
        assert!(wait_for(|| received.lock().unwrap().len() == 1));
    }

    #[test]
    fn test_lost_fix_keeps_last_location() {
        let (link, handle) = link();
        link.connect("gps0", 9600).unwrap();
        handle.push_line(GGA);
        assert!(wait_for(|| link.has_valid_fix()));

        handle.push_line(GGA_NO_FIX);
        assert!(wait_for(|| !link.has_valid_fix()));
        assert!(link.current_location().is_some());
    }

    #[test]
    fn test_corrupt_sentence_counted_and_ignored() {
        let (link, handle) = link();
        link.connect("gps0", 9600).unwrap();
        handle.push_line(&GGA.replace("*69", "*68"));
        assert!(wait_for(|| link.metrics().parse_errors == 1));
        assert!(link.current_location().is_none());
    }

    #[test]
    fn test_disconnect_resets_state() {
        let (link, handle) = link();
        link.connect("gps0", 9600).unwrap();
        handle.push_line(GGA);
        assert!(wait_for(|| link.current_location().is_some()));

        link.disconnect();
        assert!(!link.is_connected());
        assert!(!link.has_valid_fix());
        assert!(link.current_location().is_none());
    }
}
