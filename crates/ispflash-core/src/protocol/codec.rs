//! Command frame encoding.
//!
//! Two families share one command shape:
//!
//! - **Register**: `[reg LE16] [payload]` for writes, `[reg LE16]` for reads.
//!   Command values are LE16, page writes append an LE16 checksum.
//! - **Opcode**: `[slave] [opcode] [payload]` for writes, `[slave] [sub]` for
//!   reads. Multi-byte fields inside the payload are big-endian.

use std::fmt;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::constants::{CMD_BEGIN_BACKGROUND_UPDATE, ETP_I2C_IAP_REG};

/// Protocol family spoken by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFamily {
    /// Register-addressed I2C (touchpad IAP).
    Register,
    /// Opcode-addressed I2C over USB (hub co-processor ISP).
    Opcode,
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolFamily::Register => write!(f, "register"),
            ProtocolFamily::Opcode => write!(f, "opcode"),
        }
    }
}

impl std::str::FromStr for ProtocolFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "register" => Ok(ProtocolFamily::Register),
            "opcode" => Ok(ProtocolFamily::Opcode),
            other => Err(format!("unknown protocol family '{other}'")),
        }
    }
}

/// One device command. Constructed per call, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    target: u8,
    sub_address: u16,
    payload: &'a [u8],
}

impl<'a> Command<'a> {
    /// Opcode-family command addressed to `target`.
    pub const fn opcode(target: u8, opcode: u8, payload: &'a [u8]) -> Self {
        Self {
            target,
            sub_address: opcode as u16,
            payload,
        }
    }

    /// Register-family command.
    pub const fn register(register: u16, payload: &'a [u8]) -> Self {
        Self {
            target: 0,
            sub_address: register,
            payload,
        }
    }

    pub fn target(&self) -> u8 {
        self.target
    }

    pub fn sub_address(&self) -> u16 {
        self.sub_address
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

/// Frame encoder for one protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCodec {
    Register,
    Opcode,
}

impl From<ProtocolFamily> for CommandCodec {
    fn from(family: ProtocolFamily) -> Self {
        match family {
            ProtocolFamily::Register => CommandCodec::Register,
            ProtocolFamily::Opcode => CommandCodec::Opcode,
        }
    }
}

impl CommandCodec {
    /// Encode a write frame.
    pub fn encode_write(&self, cmd: &Command<'_>) -> Vec<u8> {
        let mut frame = self.encode_read(cmd);
        frame.extend_from_slice(cmd.payload);
        frame
    }

    /// Encode the addressing header of a read. The payload is ignored.
    pub fn encode_read(&self, cmd: &Command<'_>) -> Vec<u8> {
        let mut frame = Vec::with_capacity(2 + cmd.payload.len());
        match self {
            CommandCodec::Register => {
                let mut reg = [0u8; 2];
                LittleEndian::write_u16(&mut reg, cmd.sub_address);
                frame.extend_from_slice(&reg);
            }
            CommandCodec::Opcode => {
                frame.push(cmd.target);
                frame.push(cmd.sub_address as u8);
            }
        }
        frame
    }
}

/// `[reg LE16] [value LE16]`.
pub fn encode_register_write(register: u16, value: u16) -> [u8; 4] {
    let mut buf = [0u8; 4];
    LittleEndian::write_u16(&mut buf[0..2], register);
    LittleEndian::write_u16(&mut buf[2..4], value);
    buf
}

/// Firmware page frame: `[IAP_REG LE16] [data] [checksum LE16]`.
pub fn encode_register_page(data: &[u8], checksum: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() + 4);
    frame.extend_from_slice(&ETP_I2C_IAP_REG.to_le_bytes());
    frame.extend_from_slice(data);
    frame.extend_from_slice(&checksum.to_le_bytes());
    frame
}

/// Payload of "begin background update": `[0x05] [block size BE16]`.
pub fn encode_begin_update(block_size: u16) -> [u8; 3] {
    let mut buf = [CMD_BEGIN_BACKGROUND_UPDATE, 0, 0];
    BigEndian::write_u16(&mut buf[1..3], block_size);
    buf
}
