//! Firmware image parsing.
//!
//! Touchpad IAP images carry their transfer parameters in the image itself:
//! - word `0x0083` holds the IAP start address, in words
//! - the word at the IAP start points (in words) at the module id
//!
//! Hub co-processor images are sent whole and carry no header.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

use super::chunk::Chunks;
use crate::protocol::ProtocolFamily;
use crate::protocol::constants::{ETP_IAP_START_ADDR, FW_PAGE_SIZE};

#[derive(Error, Debug)]
pub enum FirmwareError {
    #[error("File too small to read {field} at 0x{offset:x}: {actual} bytes")]
    Truncated {
        field: &'static str,
        offset: usize,
        actual: usize,
    },
    #[error("IAP address 0x{iap_address:x} invalid for image of 0x{length:x} bytes")]
    IapAddressOutOfRange { iap_address: usize, length: usize },
    #[error("Image of {length} bytes exceeds device capacity of {capacity} bytes")]
    TooLarge { length: usize, capacity: usize },
    #[error("Invalid block size {0}")]
    InvalidBlockSize(usize),
    #[error("Start address 0x{start:x} beyond image end 0x{length:x}")]
    StartBeyondEnd { start: usize, length: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed, read-only firmware image.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
    module_id: Option<u16>,
    iap_address: usize,
}

impl FirmwareImage {
    /// Parse an image in the container format of `family`.
    pub fn parse(family: ProtocolFamily, data: Vec<u8>) -> Result<Self, FirmwareError> {
        match family {
            ProtocolFamily::Register => Self::from_iap_bytes(data),
            ProtocolFamily::Opcode => Ok(Self::from_raw_bytes(data)),
        }
    }

    /// Parse a touchpad IAP image.
    pub fn from_iap_bytes(data: Vec<u8>) -> Result<Self, FirmwareError> {
        let iap_words = read_u16_at(&data, ETP_IAP_START_ADDR * 2, "IAP start address")?;
        let iap_address = iap_words as usize * 2;
        if iap_address > data.len() {
            return Err(FirmwareError::IapAddressOutOfRange {
                iap_address,
                length: data.len(),
            });
        }

        // An image ending at the IAP start has no payload and no module id.
        let module_id = if iap_address == data.len() {
            None
        } else {
            let module_ptr = read_u16_at(&data, iap_address, "module id pointer")?;
            Some(read_u16_at(&data, module_ptr as usize * 2, "module id")?)
        };

        Ok(Self {
            data,
            module_id,
            iap_address,
        })
    }

    /// Wrap a headerless image; transfer starts at offset 0.
    pub fn from_raw_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            module_id: None,
            iap_address: 0,
        }
    }

    /// Reject images larger than `page_count` firmware pages.
    pub fn check_capacity(&self, page_count: u16) -> Result<(), FirmwareError> {
        let capacity = page_count as usize * FW_PAGE_SIZE;
        if self.data.len() > capacity {
            return Err(FirmwareError::TooLarge {
                length: self.data.len(),
                capacity,
            });
        }
        Ok(())
    }

    /// Module id the image was built for, if it names one.
    pub fn module_id(&self) -> Option<u16> {
        self.module_id
    }

    /// Byte offset where the transfer begins.
    pub fn iap_address(&self) -> usize {
        self.iap_address
    }

    /// `length` bytes at `address`, if fully inside the image.
    pub fn slice(&self, address: usize, length: usize) -> Option<&[u8]> {
        let end = address.checked_add(length)?;
        self.data.get(address..end)
    }

    /// Split the image from `start` into blocks of `block_size`.
    pub fn chunks(&self, start: usize, block_size: usize) -> Result<Chunks<'_>, FirmwareError> {
        Chunks::new(&self.data, start, block_size)
    }

    /// Get total size.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn read_u16_at(data: &[u8], offset: usize, field: &'static str) -> Result<u16, FirmwareError> {
    let truncated = FirmwareError::Truncated {
        field,
        offset,
        actual: data.len(),
    };
    let Some(bytes) = data.get(offset..offset.saturating_add(2)) else {
        return Err(truncated);
    };
    let mut cursor = Cursor::new(bytes);
    Ok(cursor.read_u16::<LittleEndian>()?)
}

/// Wrapping sum of the LE 16-bit words of `data`.
///
/// A trailing odd byte counts as a word with a zero high byte.
pub fn calc_checksum(data: &[u8]) -> u16 {
    data.chunks(2).fold(0u16, |sum, word| {
        let value = match word {
            [lo, hi] => u16::from_le_bytes([*lo, *hi]),
            [lo] => *lo as u16,
            _ => 0,
        };
        sum.wrapping_add(value)
    })
}
