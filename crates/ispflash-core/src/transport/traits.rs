//! Transport layer abstraction.
//!
//! Defines the `Transport` trait for moving raw command frames to and from a
//! peripheral controller, allowing different implementations (I2C character
//! device, USB control transfers, mock).

use std::thread;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract frame transport.
///
/// Implementations carry no protocol knowledge: frames arrive fully encoded
/// and failures are reported, never retried.
pub trait Transport: Send {
    /// Write one encoded command frame.
    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Read `len` bytes from the location selected by the encoded read
    /// `header`.
    ///
    /// A zero-length read performs no I/O and returns an empty buffer.
    fn read(&mut self, header: &[u8], len: usize) -> Result<Vec<u8>, TransportError>;

    /// Wait for the device to settle after a write.
    ///
    /// Every write that is followed by a read must be separated from it by
    /// one of these waits.
    fn settle(&mut self, delay: Duration) {
        thread::sleep(delay);
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        (**self).write(frame)
    }

    fn read(&mut self, header: &[u8], len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read(header, len)
    }

    fn settle(&mut self, delay: Duration) {
        (**self).settle(delay)
    }
}
