//! Sensor board link service
//!
//! SerialLinkReader + SensorProtocolDecoder. Every reading carries the GPS fix
//! current at the time; sync requests (`GET,<seq>,<ticks>`) go out through `SensorCommander`.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use contracts::{
    ContractError, GpsFix, Listener, ListenerRegistry, SensorCommander, SensorReading,
    SubscriptionId, TimeBase,
};
use tracing::{instrument, trace};

use crate::error::Result;
use crate::gps::GpsLink;
use crate::link::LinkOpener;
use crate::metrics::{LinkMetrics, LinkMetricsSnapshot};
use crate::packet::SensorProtocolDecoder;
use crate::reader::{SerialLinkReader, DEFAULT_READ_TIMEOUT};
use crate::snapshot::Snapshot;

const LINK_NAME: &str = "sensor";

struct SensorState {
    time_base: TimeBase,
    decoder: SensorProtocolDecoder,
    current: Snapshot<SensorReading>,
    readings: ListenerRegistry<SensorReading>,
    gps: RwLock<Option<Arc<Snapshot<GpsFix>>>>,
}

impl SensorState {
    fn handle_line(&self, line: &str, metrics: &LinkMetrics) {
        let timestamp = self.time_base.now();
        let Some(mut reading) = self.decoder.decode(line, timestamp) else {
            metrics.record_parse_error();
            return;
        };

        let gps = self
            .gps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        reading.gps_sync = gps.and_then(|cell| cell.load()).map(|fix| *fix);

        metrics.record_decoded();
        trace!(
            sequence = ?reading.sequence,
            temperature = reading.temperature,
            "Sensor reading"
        );
        self.readings.notify(&reading);
        self.current.store(reading);
    }
}

/// Environmental / IMU board link
pub struct SensorLink {
    reader: SerialLinkReader,
    state: Arc<SensorState>,
}

impl SensorLink {
    pub fn new(opener: Arc<dyn LinkOpener>, time_base: TimeBase) -> Self {
        Self::with_read_timeout(opener, time_base, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_read_timeout(
        opener: Arc<dyn LinkOpener>,
        time_base: TimeBase,
        read_timeout: Duration,
    ) -> Self {
        let reader = SerialLinkReader::new(LINK_NAME, opener).with_read_timeout(read_timeout);
        let state = Arc::new(SensorState {
            time_base,
            decoder: SensorProtocolDecoder::new(),
            current: Snapshot::new(),
            readings: ListenerRegistry::new(),
            gps: RwLock::new(None),
        });

        let handler = Arc::clone(&state);
        let metrics = Arc::clone(reader.metrics());
        reader.subscribe_lines(Arc::new(move |line: &String| {
            handler.handle_line(line, &metrics);
        }));

        Self { reader, state }
    }

    /// Stamp every reading with the latest fix from `gps`
    pub fn attach_gps(&self, gps: &GpsLink) {
        *self
            .state
            .gps
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(gps.location_cell());
    }

    #[instrument(name = "sensor_connect", skip(self))]
    pub fn connect(&self, port: &str, baud_rate: u32) -> Result<()> {
        self.reader.connect(port, baud_rate)
    }

    pub fn disconnect(&self) {
        self.reader.disconnect();
        self.state.current.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_connected()
    }

    /// Latest decoded reading
    pub fn current_reading(&self) -> Option<Arc<SensorReading>> {
        self.state.current.load()
    }

    /// Register a reading callback (runs on the sensor reader thread)
    pub fn subscribe(&self, listener: Listener<SensorReading>) -> SubscriptionId {
        self.state.readings.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.readings.unsubscribe(id)
    }

    /// Blocking write of one command line
    pub fn write_command(&self, command: &str) -> Result<()> {
        self.reader.write_line(command)
    }

    pub fn metrics(&self) -> LinkMetricsSnapshot {
        self.reader.metrics().snapshot()
    }
}

impl SensorCommander for SensorLink {
    fn is_connected(&self) -> bool {
        self.reader.is_connected()
    }

    async fn send_command(&self, command: &str) -> std::result::Result<(), ContractError> {
        let writer = self.reader.writer()?;
        let line = command.to_string();
        tokio::task::spawn_blocking(move || writer.write_line(&line))
            .await
            .map_err(|e| ContractError::device_command(LINK_NAME, e.to_string()))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLinkHandle, MockOpener};
    use std::sync::Mutex;
    use std::time::Instant;

    const SYNC_PACKET: &str =
        "*SYNC,3,1000,0.8,512,40.0,22.0,0,0,9.8,0,0,0,1,2,3,0.5,0.6,0.7@";
    const GGA: &str = "$GPGGA,063802.00,3724.41511,N,12643.37321,E,1,07,1.23,42.8,M,25.0,M,,*69";

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

    fn setup() -> (Arc<MockOpener>, SensorLink, MockLinkHandle) {
        let opener = Arc::new(MockOpener::new());
        let handle = opener.add_port("sensor0");
        let link = SensorLink::with_read_timeout(
            Arc::clone(&opener) as Arc<dyn LinkOpener>,
            TimeBase::new(),
            Duration::from_millis(20),
        );
        (opener, link, handle)
    }

    #[test]
    fn test_reading_published() {
        let (_opener, link, handle) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        link.subscribe(Arc::new(move |r: &SensorReading| {
            sink.lock().unwrap().push(r.sequence);
        }));

        link.connect("sensor0", 115_200).unwrap();
        handle.push_line(SYNC_PACKET);
        handle.push_line("*1,2@");

        assert!(wait_for(|| link.metrics().parse_errors == 1));
        assert_eq!(*seen.lock().unwrap(), vec![Some(3)]);
        let current = link.current_reading().unwrap();
        assert_eq!(current.light_level, 50.0);
        assert!(current.gps_sync.is_none());
    }

    #[test]
    fn test_gps_fix_attached_to_readings() {
        let (opener, link, handle) = setup();
        let gps_handle = opener.add_port("gps0");
        let gps = GpsLink::with_read_timeout(
            Arc::clone(&opener) as Arc<dyn LinkOpener>,
            TimeBase::new(),
            Duration::from_millis(20),
        );
        gps.connect("gps0", 9600).unwrap();
        gps_handle.push_line(GGA);
        assert!(wait_for(|| gps.current_location().is_some()));

        link.attach_gps(&gps);
        link.connect("sensor0", 115_200).unwrap();
        handle.push_line(SYNC_PACKET);

        assert!(wait_for(|| link.current_reading().is_some()));
        let fix = link.current_reading().unwrap().gps_sync.unwrap();
        assert_eq!(fix.satellites, Some(7));
    }

    #[tokio::test]
    async fn test_send_command_requires_connection() {
        let (_opener, link, handle) = setup();
        let err = SensorCommander::send_command(&link, "GET,1,0")
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::NotConnected { .. }));

        link.connect("sensor0", 115_200).unwrap();
        SensorCommander::send_command(&link, "GET,1,0").await.unwrap();
        assert_eq!(handle.written(), vec!["GET,1,0"]);
    }
}
