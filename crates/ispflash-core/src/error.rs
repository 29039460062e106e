//! Top-level update errors.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::lock::Mode;
use crate::payload::FirmwareError;
use crate::protocol::StatusFault;
use crate::transport::TransportError;

/// Step of an update or setup call an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Detach,
    EnableIsp,
    VerifyIdentity,
    Streaming,
    Commit,
    ExitUpdate,
    Attach,
    ReadVersion,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Detach => write!(f, "detach"),
            Phase::EnableIsp => write!(f, "enable-isp"),
            Phase::VerifyIdentity => write!(f, "identity"),
            Phase::Streaming => write!(f, "streaming"),
            Phase::Commit => write!(f, "commit"),
            Phase::ExitUpdate => write!(f, "exit"),
            Phase::Attach => write!(f, "attach"),
            Phase::ReadVersion => write!(f, "version"),
        }
    }
}

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Transport failure during {phase}: {source}")]
    Transport {
        phase: Phase,
        #[source]
        source: TransportError,
    },

    #[error("Device {fault} during {phase} (status 0x{status:04X}{})", at_address(.address))]
    ProtocolStatus {
        phase: Phase,
        status: u16,
        address: Option<usize>,
        fault: StatusFault,
    },

    #[error(
        "Device not ready during {phase} after {attempts} attempts (last status {})",
        last_status_text(.last_status)
    )]
    TimeoutExhausted {
        phase: Phase,
        attempts: u32,
        last_status: Option<u16>,
    },

    #[error("Invalid firmware file: {0}")]
    FileFormat(#[from] FirmwareError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Mode lock already held, device is in {mode} mode")]
    LockHeld { mode: Mode },

    #[error("{original}; returning to normal mode also failed: {release}")]
    Release {
        original: Box<UpdateError>,
        release: Box<UpdateError>,
    },
}

impl UpdateError {
    pub(crate) fn transport(phase: Phase, source: TransportError) -> Self {
        UpdateError::Transport { phase, source }
    }

    /// Phase the error was raised in, if it came from the device.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            UpdateError::Transport { phase, .. }
            | UpdateError::ProtocolStatus { phase, .. }
            | UpdateError::TimeoutExhausted { phase, .. } => Some(*phase),
            UpdateError::Release { original, .. } => original.phase(),
            UpdateError::FileFormat(_) | UpdateError::Config(_) | UpdateError::LockHeld { .. } => {
                None
            }
        }
    }

    /// Combine the outcome of a guarded region with the outcome of its
    /// release. The guarded error always stays first.
    pub(crate) fn combine<R>(
        guarded: Result<R, UpdateError>,
        released: Result<(), UpdateError>,
    ) -> Result<R, UpdateError> {
        match (guarded, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(original), Ok(())) => Err(original),
            (Ok(_), Err(release)) => Err(release),
            (Err(original), Err(release)) => Err(UpdateError::Release {
                original: Box::new(original),
                release: Box::new(release),
            }),
        }
    }
}

fn at_address(address: &Option<usize>) -> String {
    match address {
        Some(addr) => format!(", address 0x{addr:X}"),
        None => String::new(),
    }
}

fn last_status_text(status: &Option<u16>) -> String {
    match status {
        Some(s) => format!("0x{s:04X}"),
        None => "none".to_string(),
    }
}
