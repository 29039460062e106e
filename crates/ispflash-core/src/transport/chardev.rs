//! Raw I2C character device transport.
//!
//! Frames are written with a positional write at offset 0 and responses are
//! read the same way, mirroring the `pwrite`/`pread` access the i2c-dev
//! driver expects once the slave address has been selected.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use tracing::{debug, instrument};

use super::traits::{Transport, TransportError};

/// Transport over an already-addressed I2C character device.
pub struct I2cDevTransport {
    file: File,
}

impl I2cDevTransport {
    /// Wrap a handle opened by the host.
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Open a device node read/write.
    #[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TransportError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;
        Ok(Self::new(file))
    }

    fn write_frame(&self, frame: &[u8]) -> Result<(), TransportError> {
        let n = self
            .file
            .write_at(frame, 0)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        if n != frame.len() {
            return Err(TransportError::ShortTransfer {
                expected: frame.len(),
                actual: n,
            });
        }
        Ok(())
    }
}

impl Transport for I2cDevTransport {
    #[instrument(skip(self, frame), fields(len = frame.len()))]
    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.write_frame(frame)?;
        debug!(bytes_written = frame.len(), "Write complete");
        Ok(())
    }

    #[instrument(skip(self, header))]
    fn read(&mut self, header: &[u8], len: usize) -> Result<Vec<u8>, TransportError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        self.write_frame(header)?;

        let mut buf = vec![0u8; len];
        let n = self
            .file
            .read_at(&mut buf, 0)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        if n != len {
            return Err(TransportError::ShortTransfer {
                expected: len,
                actual: n,
            });
        }
        debug!(bytes_read = n, "Read complete");
        Ok(buf)
    }
}
