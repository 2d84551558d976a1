//! # Devices
//!
//! 模拟硬件：相机、NMEA GPS、传感器板。
//!
//! 串口设备挂在 `ingestion::MockOpener` 上，真实的 `GpsLink` / `SensorLink`
//! 读线程照常工作，所以模拟运行会走完整的解析与落盘链路。

pub mod camera;
pub mod gps;
pub mod sensor_board;

use std::sync::Arc;

use contracts::{AcquisitionBlueprint, RecordingMode};
use ingestion::{LinkOpener, MockOpener};
use tracing::info;

pub use camera::{MockCamera, MockCameraConfig, TEMPERATURE_RANGE};
pub use gps::{gga_sentence, nmea_sentence, rmc_sentence, SimulatedGps, SimulatedGpsConfig};
pub use sensor_board::{
    legacy_packet, parse_get_request, sync_packet, BoardSample, SimulatedSensorBoard,
    SimulatedSensorConfig,
};

/// Port names used when the blueprint leaves them empty
pub const SIM_GPS_PORT: &str = "SIM-GPS";
pub const SIM_SENSOR_PORT: &str = "SIM-SENSOR";

fn port_or(configured: &str, fallback: &str) -> String {
    if configured.trim().is_empty() {
        fallback.to_string()
    } else {
        configured.to_string()
    }
}

/// Camera, GPS and sensor board wired to the ports named in a blueprint
pub struct SimulatedRig {
    opener: Arc<MockOpener>,
    gps_port: String,
    sensor_port: String,
    pub camera: Arc<MockCamera>,
    pub gps: SimulatedGps,
    pub sensor: SimulatedSensorBoard,
}

impl SimulatedRig {
    pub fn new(blueprint: &AcquisitionBlueprint) -> Self {
        Self::with_configs(
            blueprint,
            SimulatedGpsConfig::default(),
            SimulatedSensorConfig::default(),
        )
    }

    pub fn with_configs(
        blueprint: &AcquisitionBlueprint,
        gps_config: SimulatedGpsConfig,
        sensor_config: SimulatedSensorConfig,
    ) -> Self {
        let gps_port = port_or(&blueprint.gps.port, SIM_GPS_PORT);
        let mut sensor_port = port_or(&blueprint.sensor.port, SIM_SENSOR_PORT);
        if sensor_port == gps_port {
            sensor_port = SIM_SENSOR_PORT.to_string();
        }

        let opener = Arc::new(MockOpener::new());
        let gps = SimulatedGps::new(opener.add_port(&gps_port), gps_config);
        let sensor = SimulatedSensorBoard::new(opener.add_port(&sensor_port), sensor_config);
        let camera = Arc::new(MockCamera::new(MockCameraConfig::from(&blueprint.camera)));

        Self {
            opener,
            gps_port,
            sensor_port,
            camera,
            gps,
            sensor,
        }
    }

    /// Opener to hand to `GpsLink::new` / `SensorLink::new`
    pub fn opener(&self) -> Arc<dyn LinkOpener> {
        Arc::clone(&self.opener) as Arc<dyn LinkOpener>
    }

    pub fn gps_port(&self) -> &str {
        &self.gps_port
    }

    pub fn sensor_port(&self) -> &str {
        &self.sensor_port
    }

    /// Point the blueprint's serial sections at the simulated ports
    pub fn apply_ports(&self, blueprint: &mut AcquisitionBlueprint) {
        blueprint.gps.port = self.gps_port.clone();
        blueprint.sensor.port = self.sensor_port.clone();
    }

    /// Start every device
    ///
    /// The sensor board free-runs only in continuous mode; in synchronized
    /// mode it speaks only when asked.
    pub fn start(&self, mode: RecordingMode) {
        self.camera.start_streaming();
        self.gps.start();
        if mode == RecordingMode::Continuous {
            self.sensor.start_streaming();
        }
        info!(mode = mode.as_str(), "Simulated devices started");
    }

    pub fn stop(&self) {
        self.camera.stop_streaming();
        self.gps.stop();
        self.sensor.stop_streaming();
        info!(
            gps_fixes = self.gps.emitted(),
            sync_replies = self.sensor.requests_answered(),
            camera_triggers = self.camera.trigger_count(),
            "Simulated devices stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::TimeBase;
    use ingestion::{GpsLink, SensorLink};
    use std::time::Duration;

    #[test]
    fn test_configured_ports_kept() {
        let mut blueprint = AcquisitionBlueprint::default();
        blueprint.gps.port = "/dev/ttyUSB0".to_string();
        blueprint.sensor.port = "/dev/ttyUSB0".to_string();
        let rig = SimulatedRig::new(&blueprint);
        assert_eq!(rig.gps_port(), "/dev/ttyUSB0");
        assert_eq!(rig.sensor_port(), SIM_SENSOR_PORT);

        let mut applied = AcquisitionBlueprint::default();
        rig.apply_ports(&mut applied);
        assert_eq!(applied.gps.port, "/dev/ttyUSB0");
    }

    #[test]
    fn test_rig_feeds_real_links() {
        let blueprint = AcquisitionBlueprint::default();
        let rig = SimulatedRig::new(&blueprint);
        let time_base = TimeBase::new();

        let timeout = Duration::from_millis(20);
        let gps = GpsLink::with_read_timeout(rig.opener(), time_base.clone(), timeout);
        let sensor = SensorLink::with_read_timeout(rig.opener(), time_base, timeout);
        assert_eq!(rig.gps_port(), SIM_GPS_PORT);
        gps.connect(rig.gps_port(), 9600).unwrap();
        sensor.connect(rig.sensor_port(), 115_200).unwrap();

        rig.gps.emit_fix();
        rig.sensor.emit_reading();
        std::thread::sleep(Duration::from_millis(150));

        assert!(gps.has_valid_fix());
        assert!(gps.current_location().is_some());
        assert!(sensor.current_reading().is_some());

        sensor.write_command("GET,1,0").unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(sensor.current_reading().unwrap().sequence, Some(1));

        gps.disconnect();
        sensor.disconnect();
    }
}
