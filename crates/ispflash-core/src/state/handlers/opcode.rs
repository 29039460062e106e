//! Hub co-processor handlers (detach, ISP enable, identity, streaming, attach).
//!
//! Every command goes to the foreground controller except the detach
//! request, and every write is followed by the fixed send delay.

use tracing::{debug, info};

use super::{poll_status, short_read};
use crate::error::{Phase, UpdateError};
use crate::lock::Mode;
use crate::payload::{Chunk, FirmwareImage};
use crate::protocol::codec::encode_begin_update;
use crate::protocol::constants::*;
use crate::protocol::status::decode_opcode_version;
use crate::protocol::{Command, IdentityRequest, StatusExpectation, StatusFault, StatusReading};
use crate::session::DeviceSession;
use crate::transport::Transport;

/// Identity bytes that fit one ISP packet after the command byte.
const MAX_IDENTITY_LEN: usize = ISP_PACKET_SIZE - 1;

fn foreground(payload: &[u8]) -> Command<'_> {
    Command::opcode(UC_FOREGROUND_SLAVE_ADDR, UC_FOREGROUND_OPCODE, payload)
}

fn status_register() -> Command<'static> {
    Command::opcode(UC_FOREGROUND_SLAVE_ADDR, UC_STATUS_SUB_ADDR, &[])
}

/// Wait out the ISP status. Only the terminal code stops the poll; detach
/// confirmation is the one site that needs `STATUS_ACCEPTED`.
fn poll_ready<T: Transport>(
    session: &mut DeviceSession<T>,
    phase: Phase,
) -> Result<StatusReading, UpdateError> {
    let policy = session.config().status_policy();
    poll_status(session, phase, StatusExpectation::NotRejected, policy)
}

pub(crate) fn read_status<T: Transport>(
    session: &mut DeviceSession<T>,
    phase: Phase,
) -> Result<StatusReading, UpdateError> {
    let data = session.read_bytes(phase, &status_register(), 1)?;
    StatusReading::from_byte_response(&data).ok_or_else(|| short_read(phase, 1, data.len()))
}

pub(crate) fn detach<T: Transport>(session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
    let request = Command::opcode(UC_DETACH_SLAVE_ADDR, UC_DETACH_SUB_ADDR, &[CMD_DETACH]);
    session.write_command(Phase::Detach, &request, I2C_DELAY_AFTER_SEND)?;

    let policy = session.config().detach_policy();
    poll_status(session, Phase::Detach, StatusExpectation::Accepted, policy)?;
    session.set_mode(Mode::ForegroundUnlocked);
    Ok(())
}

pub(crate) fn attach<T: Transport>(session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
    session.write_command(Phase::Attach, &foreground(&[CMD_ATTACH]), I2C_DELAY_AFTER_SEND)?;
    session.set_mode(Mode::Normal);
    Ok(())
}

/// Ask the foreground controller for its firmware version.
pub(crate) fn read_version<T: Transport>(
    session: &mut DeviceSession<T>,
) -> Result<String, UpdateError> {
    let phase = Phase::ReadVersion;
    session.write_command(phase, &foreground(&[CMD_READ_VERSION]), I2C_DELAY_AFTER_SEND)?;
    session.settle(VERSION_RESPONSE_DELAY);

    let response = Command::opcode(UC_FOREGROUND_SLAVE_ADDR, UC_VERSION_SUB_ADDR, &[]);
    let data = session.read_bytes(phase, &response, VERSION_RESPONSE_LEN)?;
    decode_opcode_version(&data).ok_or_else(|| short_read(phase, VERSION_RESPONSE_LEN, data.len()))
}

pub(crate) fn enable_isp<T: Transport>(session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
    session.write_command(
        Phase::EnableIsp,
        &foreground(&[CMD_ENABLE_ISP, 0x01]),
        I2C_DELAY_AFTER_SEND,
    )?;
    poll_ready(session, Phase::EnableIsp)?;
    Ok(())
}

/// The device names a span of the image; echoing it back proves the image
/// belongs to this device.
pub(crate) fn verify_identity<T: Transport>(
    session: &mut DeviceSession<T>,
    image: &FirmwareImage,
) -> Result<(), UpdateError> {
    let phase = Phase::VerifyIdentity;
    session.write_command(
        phase,
        &foreground(&[CMD_REQUEST_IDENTITY, 0x01]),
        I2C_DELAY_AFTER_SEND,
    )?;
    session.settle(IDENTITY_RESPONSE_DELAY);

    let data = session.read_bytes(phase, &status_register(), IDENTITY_RESPONSE_LEN)?;
    let request = IdentityRequest::from_bytes(&data)
        .ok_or_else(|| short_read(phase, IDENTITY_RESPONSE_LEN, data.len()))?;
    if request.status != STATUS_ACCEPTED {
        return Err(UpdateError::ProtocolStatus {
            phase,
            status: request.status as u16,
            address: None,
            fault: StatusFault::NotAccepted,
        });
    }

    let address = request.address as usize;
    let length = request.length as usize;
    debug!(address = %format!("0x{:X}", address), length, "Identity requested");
    let identity = image
        .slice(address, length)
        .filter(|id| id.len() <= MAX_IDENTITY_LEN)
        .ok_or(UpdateError::ProtocolStatus {
            phase,
            status: request.status as u16,
            address: Some(address),
            fault: StatusFault::IdentityOutOfRange { length },
        })?;

    let mut payload = Vec::with_capacity(identity.len() + 1);
    payload.push(CMD_VERIFY_IDENTITY);
    payload.extend_from_slice(identity);
    session.write_command(phase, &foreground(&payload), I2C_DELAY_AFTER_SEND)?;
    poll_ready(session, phase)?;
    Ok(())
}

pub(crate) fn begin_streaming<T: Transport>(
    session: &mut DeviceSession<T>,
) -> Result<(), UpdateError> {
    let block_size = session.config().block_size();
    session.write_command(
        Phase::Streaming,
        &foreground(&encode_begin_update(block_size)),
        I2C_DELAY_AFTER_SEND,
    )?;
    info!(block_size, "Background update started");
    session.set_mode(Mode::BackgroundUpdate);
    Ok(())
}

pub(crate) fn write_chunk<T: Transport>(
    session: &mut DeviceSession<T>,
    chunk: &Chunk<'_>,
) -> Result<(), UpdateError> {
    poll_ready(session, Phase::Streaming)?;
    let data = Command::opcode(
        UC_FOREGROUND_SLAVE_ADDR,
        UC_FOREGROUND_ISP_DATA_OPCODE,
        chunk.data,
    );
    session.write_command(Phase::Streaming, &data, I2C_DELAY_AFTER_SEND)
}

pub(crate) fn commit<T: Transport>(session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
    poll_ready(session, Phase::Commit)?;
    session.write_command(
        Phase::Commit,
        &foreground(&[CMD_FINISH_UPDATE]),
        I2C_DELAY_AFTER_SEND,
    )
}

pub(crate) fn exit_update<T: Transport>(session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
    poll_ready(session, Phase::ExitUpdate)?;
    session.write_command(
        Phase::ExitUpdate,
        &foreground(&[CMD_EXIT_BACKGROUND]),
        I2C_DELAY_AFTER_SEND,
    )?;
    session.set_mode(Mode::ForegroundUnlocked);
    Ok(())
}
