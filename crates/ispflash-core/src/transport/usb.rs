//! nusb-based I2C-over-USB transport.
//!
//! The hub tunnels I2C traffic through vendor control transfers: writes go
//! out as the full `[slave, sub, payload...]` frame, reads carry the slave
//! and sub-address packed into `wIndex`.

use std::time::Duration;

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use super::traits::{Transport, TransportError};
use crate::protocol::constants::{I2C_READ_REQUEST, I2C_WRITE_REQUEST, USB_TIMEOUT};

/// Vendor control-transfer transport bound to a claimed interface.
pub struct UsbControlTransport {
    interface: Interface,
    timeout: Duration,
}

impl UsbControlTransport {
    /// Wrap an interface claimed by the host.
    pub fn new(interface: Interface) -> Self {
        Self {
            interface,
            timeout: USB_TIMEOUT,
        }
    }

    /// Open a device with specific VID/PID and claim interface 0.
    #[instrument(
        level = "info",
        fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid))
    )]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;
        let interface = device
            .claim_interface(0)
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Device opened successfully"
        );
        Ok(Self::new(interface))
    }
}

/// Pack the `[slave, sub]` read header into the control `wIndex`.
pub(crate) fn read_index(header: &[u8]) -> Result<u16, TransportError> {
    match header {
        [slave, sub] => Ok(((*sub as u16) << 8) | *slave as u16),
        _ => Err(TransportError::ReadFailed(format!(
            "read header must be slave and sub-address, got {} bytes",
            header.len()
        ))),
    }
}

impl Transport for UsbControlTransport {
    #[instrument(skip(self, frame), fields(len = frame.len()))]
    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: I2C_WRITE_REQUEST,
                    value: 0x0000,
                    index: 0x0000,
                    data: frame,
                },
                self.timeout,
            )
            .wait()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        debug!(bytes_written = frame.len(), "Write complete");
        Ok(())
    }

    #[instrument(skip(self, header))]
    fn read(&mut self, header: &[u8], len: usize) -> Result<Vec<u8>, TransportError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let index = read_index(header)?;
        let length = u16::try_from(len)
            .map_err(|_| TransportError::ReadFailed(format!("read of {len} bytes too large")))?;

        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: I2C_READ_REQUEST,
                    value: 0x0000,
                    index,
                    length,
                },
                self.timeout,
            )
            .wait()
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        if data.len() != len {
            return Err(TransportError::ShortTransfer {
                expected: len,
                actual: data.len(),
            });
        }
        debug!(bytes_read = data.len(), "Read complete");
        Ok(data)
    }
}
