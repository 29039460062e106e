//! Transfer step handlers - dispatch logic for each protocol family.
//!
//! This module is split into submodules by family:
//! - `opcode`: USB hub co-processor, opcode commands tunneled over USB
//! - `register`: I2C touchpad, register commands over a character device

pub(crate) mod opcode;
pub(crate) mod register;

use tracing::trace;

use crate::error::{Phase, UpdateError};
use crate::payload::Chunk;
use crate::protocol::{ProtocolFamily, StatusCheck, StatusExpectation, StatusReading, classify};
use crate::retry::{Attempt, RetryError, RetryPolicy, retry};
use crate::session::DeviceSession;
use crate::state::machine::TransferContext;
use crate::transport::{Transport, TransportError};

/// Failure of a single status poll attempt.
enum PollFailure {
    Pending(StatusReading),
    Failed(UpdateError),
}

impl PollFailure {
    fn into_error(self, phase: Phase, attempts: u32) -> UpdateError {
        match self {
            PollFailure::Pending(reading) => UpdateError::TimeoutExhausted {
                phase,
                attempts,
                last_status: Some(reading.value()),
            },
            PollFailure::Failed(err) => err,
        }
    }
}

/// Error for a response shorter than its decoder needs.
pub(crate) fn short_read(phase: Phase, expected: usize, actual: usize) -> UpdateError {
    UpdateError::transport(phase, TransportError::ShortTransfer { expected, actual })
}

/// Read one status value in the session's family.
pub(crate) fn read_status<T: Transport>(
    session: &mut DeviceSession<T>,
    phase: Phase,
) -> Result<StatusReading, UpdateError> {
    match session.family() {
        ProtocolFamily::Opcode => opcode::read_status(session, phase),
        ProtocolFamily::Register => register::read_status(session, phase),
    }
}

/// Poll status until it satisfies `expectation`.
///
/// Transport failures and device faults end the poll at once; only a
/// pending status spends the budget.
pub(crate) fn poll_status<T: Transport>(
    session: &mut DeviceSession<T>,
    phase: Phase,
    expectation: StatusExpectation,
    policy: RetryPolicy,
) -> Result<StatusReading, UpdateError> {
    let outcome = retry(&policy, session, |session| {
        let reading =
            read_status(session, phase).map_err(|e| Attempt::Abort(PollFailure::Failed(e)))?;
        match classify(reading, expectation) {
            StatusCheck::Ready => Ok(reading),
            StatusCheck::Pending => {
                trace!(phase = %phase, status = %reading, "Device busy");
                Err(Attempt::Retry(PollFailure::Pending(reading)))
            }
            StatusCheck::Fault(fault) => Err(Attempt::Abort(PollFailure::Failed(
                UpdateError::ProtocolStatus {
                    phase,
                    status: reading.value(),
                    address: session.address(),
                    fault,
                },
            ))),
        }
    });

    outcome.map_err(|err| match err {
        RetryError::Exhausted { attempts, last } => last.into_error(phase, attempts),
        RetryError::Aborted { attempt, error } => error.into_error(phase, attempt),
    })
}

/// Leave normal mode.
pub(crate) fn detach<T: Transport>(session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
    match session.family() {
        ProtocolFamily::Opcode => opcode::detach(session),
        ProtocolFamily::Register => register::detach(session),
    }
}

/// Return to normal mode.
pub(crate) fn attach<T: Transport>(session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
    match session.family() {
        ProtocolFamily::Opcode => opcode::attach(session),
        ProtocolFamily::Register => register::attach(session),
    }
}

/// `Idle -> Unlocked`.
pub(crate) fn enable_isp<T: Transport>(session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
    match session.family() {
        ProtocolFamily::Opcode => opcode::enable_isp(session),
        ProtocolFamily::Register => register::enable_isp(session),
    }
}

/// `Unlocked -> IdentityVerified`.
pub(crate) fn verify_identity<T: Transport>(
    session: &mut DeviceSession<T>,
    ctx: &TransferContext<'_>,
) -> Result<(), UpdateError> {
    match session.family() {
        ProtocolFamily::Opcode => opcode::verify_identity(session, ctx.image),
        ProtocolFamily::Register => register::verify_identity(session, ctx.image),
    }
}

/// `IdentityVerified -> Streaming`.
pub(crate) fn begin_streaming<T: Transport>(
    session: &mut DeviceSession<T>,
) -> Result<(), UpdateError> {
    match session.family() {
        ProtocolFamily::Opcode => opcode::begin_streaming(session),
        ProtocolFamily::Register => Ok(()),
    }
}

/// Write one block, status-acknowledged.
pub(crate) fn write_chunk<T: Transport>(
    session: &mut DeviceSession<T>,
    ctx: &mut TransferContext<'_>,
    chunk: &Chunk<'_>,
) -> Result<(), UpdateError> {
    match session.family() {
        ProtocolFamily::Opcode => opcode::write_chunk(session, chunk),
        ProtocolFamily::Register => register::write_chunk(session, ctx, chunk),
    }
}

/// `Streaming -> Committed`.
pub(crate) fn commit<T: Transport>(
    session: &mut DeviceSession<T>,
    ctx: &TransferContext<'_>,
) -> Result<(), UpdateError> {
    match session.family() {
        ProtocolFamily::Opcode => opcode::commit(session),
        ProtocolFamily::Register => register::commit(session, ctx),
    }
}

/// `Committed -> Exited`.
pub(crate) fn exit_update<T: Transport>(session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
    match session.family() {
        ProtocolFamily::Opcode => opcode::exit_update(session),
        ProtocolFamily::Register => Ok(()),
    }
}
