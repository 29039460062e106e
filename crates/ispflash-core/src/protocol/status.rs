//! Status and response decoding.
//!
//! Status polls return either a single status byte (opcode family) or the
//! LE16 IAP control word (register family). Field layouts of the larger
//! responses are fixed per field, not per message.

use std::fmt;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::constants::*;

/// Raw result of one status poll.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum StatusReading {
    /// Opcode-family status byte.
    Byte(u8),
    /// Register-family IAP control word.
    Word(u16),
}

impl StatusReading {
    /// Decode a one-byte status response.
    pub fn from_byte_response(bytes: &[u8]) -> Option<Self> {
        bytes.first().map(|&b| StatusReading::Byte(b))
    }

    /// Decode a two-byte LE register response.
    pub fn from_word_response(bytes: &[u8]) -> Option<Self> {
        decode_word(bytes).map(StatusReading::Word)
    }

    /// Raw value, widened.
    pub fn value(&self) -> u16 {
        match self {
            StatusReading::Byte(b) => *b as u16,
            StatusReading::Word(w) => *w,
        }
    }
}

impl fmt::Debug for StatusReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReading::Byte(b) => write!(f, "StatusReading(0x{b:02X})"),
            StatusReading::Word(w) => write!(f, "StatusReading(0x{w:04X})"),
        }
    }
}

impl fmt::Display for StatusReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReading::Byte(b) => write!(f, "0x{b:02X}"),
            StatusReading::Word(w) => write!(f, "0x{w:04X}"),
        }
    }
}

/// What a poll site waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusExpectation {
    /// Status byte equals `STATUS_ACCEPTED`; `STATUS_FAILED` is terminal.
    Accepted,
    /// Any status byte except `STATUS_FAILED`, which is terminal.
    NotRejected,
    /// No IAP error flag is set.
    NoErrorFlags,
    /// The main-mode flag is clear; IAP error flags are terminal.
    LeftMainMode,
}

/// A defined failure reported by the device, or detected from its answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFault {
    /// Terminal status code.
    Rejected,
    /// Response status was not the accepted code.
    NotAccepted,
    /// IAP interface error flag.
    InterfaceError,
    /// IAP page error flag.
    PageError,
    /// Password check failed.
    PasswordCheck,
    /// Device checksum differs from the computed one.
    Checksum { expected: u16 },
    /// Device module id differs from the image.
    ModuleMismatch { expected: u16 },
    /// Device asked for identity bytes outside the image.
    IdentityOutOfRange { length: usize },
}

impl fmt::Display for StatusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFault::Rejected => write!(f, "terminal status"),
            StatusFault::NotAccepted => write!(f, "status not accepted"),
            StatusFault::InterfaceError => write!(f, "IAP interface error"),
            StatusFault::PageError => write!(f, "IAP page error"),
            StatusFault::PasswordCheck => write!(f, "password check failed"),
            StatusFault::Checksum { expected } => {
                write!(f, "checksum mismatch, expected 0x{expected:04X}")
            }
            StatusFault::ModuleMismatch { expected } => {
                write!(f, "module id mismatch, image has 0x{expected:04X}")
            }
            StatusFault::IdentityOutOfRange { length } => {
                write!(f, "identity of {length} bytes outside image")
            }
        }
    }
}

/// Outcome of interpreting one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCheck {
    Ready,
    Pending,
    Fault(StatusFault),
}

/// Map IAP control-word error bits to a fault.
pub fn iap_flag_fault(ctrl: u16) -> Option<StatusFault> {
    if ctrl & ETP_FW_IAP_INTF_ERR != 0 {
        Some(StatusFault::InterfaceError)
    } else if ctrl & ETP_FW_IAP_PAGE_ERR != 0 {
        Some(StatusFault::PageError)
    } else if ctrl & ETP_FW_IAP_CHECK_PW != 0 {
        Some(StatusFault::PasswordCheck)
    } else {
        None
    }
}

/// Interpret a reading against what the poll site expects.
pub fn classify(reading: StatusReading, expectation: StatusExpectation) -> StatusCheck {
    match (expectation, reading) {
        (StatusExpectation::Accepted, StatusReading::Byte(STATUS_ACCEPTED)) => StatusCheck::Ready,
        (StatusExpectation::Accepted, StatusReading::Byte(STATUS_FAILED)) => {
            StatusCheck::Fault(StatusFault::Rejected)
        }
        (StatusExpectation::Accepted, _) => StatusCheck::Pending,
        (StatusExpectation::NotRejected, StatusReading::Byte(STATUS_FAILED)) => {
            StatusCheck::Fault(StatusFault::Rejected)
        }
        (StatusExpectation::NotRejected, _) => StatusCheck::Ready,
        (StatusExpectation::NoErrorFlags, reading) => match iap_flag_fault(reading.value()) {
            Some(fault) => StatusCheck::Fault(fault),
            None => StatusCheck::Ready,
        },
        (StatusExpectation::LeftMainMode, reading) => {
            let ctrl = reading.value();
            if let Some(fault) = iap_flag_fault(ctrl) {
                StatusCheck::Fault(fault)
            } else if ctrl & ETP_I2C_MAIN_MODE_ON != 0 {
                StatusCheck::Pending
            } else {
                StatusCheck::Ready
            }
        }
    }
}

/// Identity request answer: `{status u8, address u32 BE, count u8}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityRequest {
    pub status: u8,
    pub address: u32,
    pub length: u8,
}

impl IdentityRequest {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < IDENTITY_RESPONSE_LEN {
            return None;
        }
        Some(Self {
            status: bytes[0],
            address: BigEndian::read_u32(&bytes[1..5]),
            length: bytes[5],
        })
    }
}

/// Decode an LE16 register response.
pub fn decode_word(bytes: &[u8]) -> Option<u16> {
    if bytes.len() < ETP_I2C_INF_LENGTH {
        return None;
    }
    Some(LittleEndian::read_u16(bytes))
}

/// Version from the opcode-family version response, bytes 1 and 2.
pub fn decode_opcode_version(bytes: &[u8]) -> Option<String> {
    if bytes.len() < VERSION_RESPONSE_LEN {
        return None;
    }
    Some(format!("{}.{}", bytes[1], bytes[2]))
}

/// Version from a register-family version word: high byte, low byte.
pub fn version_from_word(word: u16) -> String {
    let [lo, hi] = word.to_le_bytes();
    format!("{hi}.{lo}")
}
