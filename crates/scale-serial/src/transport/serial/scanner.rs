//! Serial port enumeration
//!
//! Wraps `serialport::available_ports()` and maps the platform port types to
//! [`PortInfo`]. Enumeration hits the OS (udev, IOKit, SetupAPI) so it runs on
//! the blocking pool.

use serialport::{SerialPortInfo, SerialPortType};
use tracing::debug;

use crate::transport::{PortInfo, PortKind, TransportError};

/// List the serial ports currently present on the system
pub async fn list_ports() -> Result<Vec<PortInfo>, TransportError> {
    let ports = tokio::task::spawn_blocking(serialport::available_ports)
        .await
        .map_err(|e| TransportError::Unsupported(format!("Port scan task failed: {}", e)))?
        .map_err(|e| TransportError::Unsupported(format!("Cannot enumerate ports: {}", e)))?;

    let ports: Vec<PortInfo> = ports.into_iter().map(port_info).collect();
    debug!(count = ports.len(), "Enumerated serial ports");
    Ok(ports)
}

/// Pick the port used when none is configured: the first USB adapter, or
/// else the first port of any kind
pub fn select_default(ports: &[PortInfo]) -> Option<&PortInfo> {
    ports
        .iter()
        .find(|p| p.kind == PortKind::Usb)
        .or_else(|| ports.first())
}

fn port_info(info: SerialPortInfo) -> PortInfo {
    let mut port = PortInfo {
        name: info.port_name,
        kind: PortKind::Unknown,
        vid: None,
        pid: None,
        manufacturer: None,
        product: None,
        serial_number: None,
    };

    match info.port_type {
        SerialPortType::UsbPort(usb) => {
            port.kind = PortKind::Usb;
            port.vid = Some(usb.vid);
            port.pid = Some(usb.pid);
            port.manufacturer = usb.manufacturer;
            port.product = usb.product;
            port.serial_number = usb.serial_number;
        }
        SerialPortType::PciPort => port.kind = PortKind::Pci,
        SerialPortType::BluetoothPort => port.kind = PortKind::Bluetooth,
        SerialPortType::Unknown => {}
    }
    port
}
