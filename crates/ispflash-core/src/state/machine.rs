//! Transfer state machine.
//!
//! Drives one update through
//! `Idle -> Unlocked -> IdentityVerified -> Streaming -> Committed -> Exited`.
//! Any failure moves it to `Aborted`; a later run restarts from `Idle`.

use std::fmt;

use tracing::{info, instrument};

use super::handlers;
use crate::error::UpdateError;
use crate::events::UpdateEvent;
use crate::payload::{Chunks, FirmwareError, FirmwareImage};
use crate::session::DeviceSession;
use crate::transport::Transport;

/// Position of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    /// ISP enabled.
    Unlocked,
    /// Device accepted the image identity.
    IdentityVerified,
    /// Blocks are being written.
    Streaming,
    /// Finish acknowledged.
    Committed,
    /// Update mode left; terminal on success.
    Exited,
    /// Terminal on failure.
    Aborted,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferState::Idle => write!(f, "IDLE"),
            TransferState::Unlocked => write!(f, "UNLOCKED"),
            TransferState::IdentityVerified => write!(f, "IDENTITY_VERIFIED"),
            TransferState::Streaming => write!(f, "STREAMING"),
            TransferState::Committed => write!(f, "COMMITTED"),
            TransferState::Exited => write!(f, "EXITED"),
            TransferState::Aborted => write!(f, "ABORTED"),
        }
    }
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Exited | TransferState::Aborted)
    }
}

/// Runtime state shared with the family handlers.
#[derive(Debug)]
pub struct TransferContext<'a> {
    /// Image being written.
    pub image: &'a FirmwareImage,
    /// Blocks from the image's IAP address.
    pub chunks: Chunks<'a>,
    /// Current state.
    pub state: TransferState,
    /// Wrapping sum of the checksums of the blocks written so far.
    pub checksum: u16,
}

impl<'a> TransferContext<'a> {
    /// Transition to a new state.
    pub fn goto_state<T: Transport>(
        &mut self,
        new_state: TransferState,
        session: &DeviceSession<T>,
    ) {
        info!(from = %self.state, to = %new_state, "State transition");
        session.emit(UpdateEvent::PhaseChanged {
            from: self.state,
            to: new_state,
        });
        self.state = new_state;
    }
}

/// Orchestrates one firmware transfer inside an already-entered mode lock.
#[derive(Debug)]
pub struct TransferStateMachine<'a> {
    ctx: TransferContext<'a>,
}

impl<'a> TransferStateMachine<'a> {
    /// Prepare a transfer of `image` in blocks of `block_size`.
    ///
    /// Fails before any device contact if the image cannot be chunked.
    pub fn new(image: &'a FirmwareImage, block_size: usize) -> Result<Self, FirmwareError> {
        let chunks = image.chunks(image.iap_address(), block_size)?;
        Ok(Self {
            ctx: TransferContext {
                image,
                chunks,
                state: TransferState::Idle,
                checksum: 0,
            },
        })
    }

    pub fn state(&self) -> TransferState {
        self.ctx.state
    }

    /// Number of blocks the transfer writes.
    pub fn total_chunks(&self) -> usize {
        self.ctx.chunks.total()
    }

    /// Run the transfer to `Exited` or `Aborted`.
    #[instrument(
        skip_all,
        fields(start = self.ctx.image.iap_address(), chunks = self.ctx.chunks.total())
    )]
    pub fn run<T: Transport>(&mut self, session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
        if self.ctx.state.is_terminal() {
            self.ctx.goto_state(TransferState::Idle, session);
        }
        self.ctx.checksum = 0;
        session.set_address(None);

        match self.drive(session) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.ctx.goto_state(TransferState::Aborted, session);
                session.emit(UpdateEvent::Aborted {
                    phase: err.phase(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn drive<T: Transport>(&mut self, session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
        loop {
            match self.ctx.state {
                TransferState::Idle => {
                    handlers::enable_isp(session)?;
                    self.ctx.goto_state(TransferState::Unlocked, session);
                }
                TransferState::Unlocked => {
                    handlers::verify_identity(session, &self.ctx)?;
                    self.ctx.goto_state(TransferState::IdentityVerified, session);
                }
                TransferState::IdentityVerified => {
                    handlers::begin_streaming(session)?;
                    self.ctx.goto_state(TransferState::Streaming, session);
                    self.stream(session)?;
                }
                TransferState::Streaming => {
                    handlers::commit(session, &self.ctx)?;
                    self.ctx.goto_state(TransferState::Committed, session);
                }
                TransferState::Committed => {
                    handlers::exit_update(session)?;
                    self.ctx.goto_state(TransferState::Exited, session);
                }
                TransferState::Exited => return Ok(()),
                TransferState::Aborted => {
                    self.ctx.goto_state(TransferState::Idle, session);
                }
            }
        }
    }

    fn stream<T: Transport>(&mut self, session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
        let chunks = self.ctx.chunks;
        let last = chunks.total().saturating_sub(1);
        for chunk in chunks.iter() {
            session.set_address(Some(chunk.address));
            handlers::write_chunk(session, &mut self.ctx, &chunk)?;
            session.emit(UpdateEvent::Progress {
                current: chunk.index,
                total: last,
            });
        }
        session.set_address(None);
        Ok(())
    }
}
