//! # Ingestion
//!
//! Serial device ingestion.
//!
//! Responsibilities:
//! - Own one serial port per device and read it on a dedicated thread
//! - Assemble `\n`-delimited lines and decode them (NMEA for GPS, the sensor
//!   board packet format for environment/IMU readings)
//! - Keep the latest fix / reading in a swap-on-write cell and fan events out
//!   to listeners
//! - Carry sync requests to the sensor board (`SensorCommander`)
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{GpsLink, SensorLink, SerialPortOpener};
//!
//! let opener = Arc::new(SerialPortOpener);
//! let gps = GpsLink::new(opener.clone(), time_base.clone());
//! gps.connect("/dev/ttyUSB0", 9600)?;
//!
//! let sensor = SensorLink::new(opener, time_base);
//! sensor.attach_gps(&gps);
//! sensor.connect("/dev/ttyACM0", 115_200)?;
//! sensor.subscribe(Arc::new(|reading| println!("{reading:?}")));
//! ```
//!
//! ## Mock Testing
//!
//! ```ignore
//! use ingestion::MockOpener;
//!
//! let opener = Arc::new(MockOpener::new());
//! let handle = opener.add_port("gps0");
//! handle.push_line("$GPGGA,...*69");
//! ```

mod error;
mod gps;
mod line;
mod link;
mod metrics;
mod mock;
mod nmea;
mod packet;
mod reader;
mod sensor;
mod snapshot;

// Re-exports
pub use error::{IngestionError, Result};
pub use gps::GpsLink;
pub use line::LineAssembler;
pub use link::{
    list_ports, LinkOpener, PortDescription, SerialLink, SerialPortLink, SerialPortOpener,
    SerialWrite,
};
pub use metrics::{LinkMetrics, LinkMetricsSnapshot};
pub use mock::{MockLinkHandle, MockOpener, MockSerialLink, Responder};
pub use nmea::{parse_coordinate, verify_checksum, GpsProtocolDecoder};
pub use packet::{normalize_light, SensorProtocolDecoder, LEGACY_FIELD_COUNT, SYNC_FIELD_COUNT};
pub use reader::{LineWriter, SerialLinkReader, DEFAULT_JOIN_TIMEOUT, DEFAULT_READ_TIMEOUT};
pub use sensor::SensorLink;
pub use snapshot::Snapshot;
