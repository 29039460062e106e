//! Transport layer module.

#[cfg(unix)]
pub mod chardev;
pub mod mock;
pub mod traits;
pub mod usb;

#[cfg(unix)]
pub use chardev::I2cDevTransport;
pub use mock::MockTransport;
pub use traits::{Transport, TransportError};
pub use usb::UsbControlTransport;
