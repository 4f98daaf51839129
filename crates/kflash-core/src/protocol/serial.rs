//! Serial port handling
//!
//! Provides the tokio-serial backed [`Transport`] and port discovery.

use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

use super::{ProtocolError, Transport};

/// Default receive buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// USB vendor ID of the WCH CH340 bridge used on K210 boards
pub const CH340_VID: u16 = 0x1A86;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    /// Whether the port sits behind the USB bridge K210 boards ship with
    pub fn is_likely_k210(&self) -> bool {
        self.vid == Some(CH340_VID)
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, manufacturer, product, serial_number) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => (
                Some(usb_info.vid),
                Some(usb_info.pid),
                usb_info.manufacturer,
                usb_info.product,
                usb_info.serial_number,
            ),
            _ => (None, None, None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            manufacturer,
            product,
            serial_number,
        }
    }
}

/// Sort key putting likely K210 bridges first, then ttyUSB*, ttyACM* and the rest
fn port_sort_key(port: &PortInfo) -> (u8, usize, String) {
    let name = port.name.as_str();
    let basename = name.rsplit('/').next().unwrap_or(name);
    let rank = if port.is_likely_k210() { 0 } else { 1 };
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (rank, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (rank + 2, num, basename.to_string());
    }
    (rank + 4, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // Linux-only: Add /dev/ttyUSB* and /dev/ttyACM* entries if present but not found by API
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyUSB") || fname.starts_with("ttyACM") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(port_sort_key);
    v
}

fn open_stream(path: &str, baud_rate: u32) -> Result<SerialStream, ProtocolError> {
    let stream = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open_native_async()?;
    tracing::debug!(path, baud_rate, "serial port opened");
    Ok(stream)
}

fn map_io(e: std::io::Error) -> ProtocolError {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::UnexpectedEof => ProtocolError::TransportClosed,
        _ => ProtocolError::IoError(e),
    }
}

/// Serial port transport
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    stream: Option<SerialStream>,
    buffer: Vec<u8>,
    /// Last (DTR, RTS) levels, restored after a reopen
    lines: Option<(bool, bool)>,
}

impl SerialTransport {
    /// Open a serial port with a receive buffer of `buffer_size` bytes
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(path: &str, baud_rate: u32, buffer_size: usize) -> Result<Self, ProtocolError> {
        let stream = open_stream(path, baud_rate)?;
        Ok(Self {
            path: path.to_string(),
            baud_rate,
            stream: Some(stream),
            buffer: vec![0u8; buffer_size.max(1)],
            lines: None,
        })
    }

    /// Device path this transport was opened on
    pub fn path(&self) -> &str {
        &self.path
    }

    fn stream(&mut self) -> Result<&mut SerialStream, ProtocolError> {
        self.stream.as_mut().ok_or(ProtocolError::TransportClosed)
    }
}

impl Transport for SerialTransport {
    async fn read(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let stream = self.stream.as_mut().ok_or(ProtocolError::TransportClosed)?;
        let n = stream.read(&mut self.buffer).await.map_err(map_io)?;
        if n == 0 {
            return Err(ProtocolError::TransportClosed);
        }
        Ok(self.buffer[..n].to_vec())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        let stream = self.stream()?;
        stream.write_all(data).await.map_err(map_io)?;
        stream.flush().await.map_err(map_io)
    }

    async fn set_control_lines(
        &mut self,
        data_terminal_ready: bool,
        request_to_send: bool,
    ) -> Result<(), ProtocolError> {
        let stream = self.stream()?;
        stream.write_data_terminal_ready(data_terminal_ready)?;
        stream.write_request_to_send(request_to_send)?;
        self.lines = Some((data_terminal_ready, request_to_send));
        Ok(())
    }

    async fn reopen(&mut self, baud_rate: u32) -> Result<(), ProtocolError> {
        // Dropping the stream closes the handle before the new one is opened
        self.stream = None;
        self.stream = Some(open_stream(&self.path, baud_rate)?);
        self.baud_rate = baud_rate;

        if let Some((dtr, rts)) = self.lines {
            self.set_control_lines(dtr, rts).await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ProtocolError> {
        if self.stream.take().is_some() {
            tracing::debug!(path = %self.path, "serial port closed");
        }
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}
