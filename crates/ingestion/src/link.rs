//! Serial transport boundary
//!
//! `SerialLink` is the byte pipe a reader thread pulls lines from.
//! `SerialPortLink` opens a real port (8-N-1, no flow control); tests and
//! simulated devices plug in [`crate::MockSerialLink`] through the same
//! `LinkOpener` seam.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::error::{IngestionError, Result};
use crate::line::LineAssembler;

/// Write half of a link, shareable with command senders
pub trait SerialWrite: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
}

/// An open serial connection
pub trait SerialLink: Send {
    /// Port this link was opened on
    fn port_name(&self) -> &str;

    /// Block up to the read timeout for one complete line.
    ///
    /// `Ok(None)` means the timeout elapsed without a full line.
    fn read_line(&mut self) -> Result<Option<String>>;

    /// Independent write handle to the same port
    fn try_clone_writer(&self) -> Result<Box<dyn SerialWrite>>;

    /// Release the port. Later reads fail with `NotConnected`.
    fn close(&mut self);
}

/// Opens links by port name
pub trait LinkOpener: Send + Sync {
    fn open(&self, port: &str, baud_rate: u32, read_timeout: Duration)
        -> Result<Box<dyn SerialLink>>;
}

/// Hardware link backed by the `serialport` crate
pub struct SerialPortLink {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
    assembler: LineAssembler,
    scratch: Vec<u8>,
}

impl SerialPortLink {
    /// Open `port` as 8-N-1 without flow control and drop stale buffered input
    pub fn open(port: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let handle = serialport::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|e| IngestionError::link_open(port, e.to_string()))?;

        if let Err(e) = handle.clear(serialport::ClearBuffer::All) {
            debug!(port = %port, error = %e, "Could not clear serial buffers");
        }

        Ok(Self {
            port_name: port.to_string(),
            port: Some(handle),
            assembler: LineAssembler::new(),
            scratch: vec![0u8; 512],
        })
    }
}

impl SerialLink for SerialPortLink {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.assembler.next_line() {
            return Ok(Some(line));
        }

        let port = self
            .port
            .as_mut()
            .ok_or_else(|| IngestionError::not_connected(&self.port_name))?;

        match port.read(&mut self.scratch) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.assembler.push(&self.scratch[..n]);
                Ok(self.assembler.next_line())
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(IngestionError::io(&self.port_name, e)),
        }
    }

    fn try_clone_writer(&self) -> Result<Box<dyn SerialWrite>> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(|| IngestionError::not_connected(&self.port_name))?;
        let clone = port
            .try_clone()
            .map_err(|e| IngestionError::link_open(&self.port_name, e.to_string()))?;
        Ok(Box::new(PortWriter {
            port_name: self.port_name.clone(),
            port: clone,
        }))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.port_name, "Serial port closed");
        }
        self.assembler.clear();
    }
}

struct PortWriter {
    port_name: String,
    port: Box<dyn SerialPort>,
}

impl SerialWrite for PortWriter {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port
            .write_all(data)
            .and_then(|_| self.port.flush())
            .map_err(|e| IngestionError::io(&self.port_name, e))
    }
}

/// Opens [`SerialPortLink`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortOpener;

impl LinkOpener for SerialPortOpener {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialLink>> {
        Ok(Box::new(SerialPortLink::open(port, baud_rate, read_timeout)?))
    }
}

/// Serial port visible to the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescription {
    pub name: String,
    pub kind: String,
}

/// Enumerate serial ports
pub fn list_ports() -> Result<Vec<PortDescription>> {
    let ports = serialport::available_ports()
        .map_err(|e| IngestionError::link_open("<enumerate>", e.to_string()))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let kind = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => match info.product {
                    Some(product) => format!("usb ({product})"),
                    None => "usb".to_string(),
                },
                serialport::SerialPortType::PciPort => "pci".to_string(),
                serialport::SerialPortType::BluetoothPort => "bluetooth".to_string(),
                serialport::SerialPortType::Unknown => "unknown".to_string(),
            };
            PortDescription {
                name: p.port_name,
                kind,
            }
        })
        .collect())
}
