//! Protocol module - command encoding and status decoding.

pub mod codec;
pub mod constants;
pub mod status;

pub use codec::{Command, CommandCodec, ProtocolFamily};
pub use constants::*;
pub use status::{
    IdentityRequest, StatusCheck, StatusExpectation, StatusFault, StatusReading, classify,
};
