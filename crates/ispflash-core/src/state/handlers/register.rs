//! Touchpad IAP handlers.

use tracing::{debug, info};

use super::{poll_status, short_read};
use crate::error::{Phase, UpdateError};
use crate::lock::Mode;
use crate::payload::{Chunk, FirmwareImage, calc_checksum};
use crate::protocol::codec::{encode_register_page, encode_register_write};
use crate::protocol::constants::*;
use crate::protocol::status::{decode_word, version_from_word};
use crate::protocol::{Command, StatusExpectation, StatusFault, StatusReading};
use crate::session::DeviceSession;
use crate::state::machine::TransferContext;
use crate::transport::Transport;

fn write_register<T: Transport>(
    session: &mut DeviceSession<T>,
    phase: Phase,
    register: u16,
    value: u16,
) -> Result<(), UpdateError> {
    session.write_frame(phase, &encode_register_write(register, value), ETP_DELAY_RESET)
}

pub(crate) fn read_register<T: Transport>(
    session: &mut DeviceSession<T>,
    phase: Phase,
    register: u16,
) -> Result<u16, UpdateError> {
    let data = session.read_bytes(phase, &Command::register(register, &[]), ETP_I2C_INF_LENGTH)?;
    decode_word(&data).ok_or_else(|| short_read(phase, ETP_I2C_INF_LENGTH, data.len()))
}

pub(crate) fn read_status<T: Transport>(
    session: &mut DeviceSession<T>,
    phase: Phase,
) -> Result<StatusReading, UpdateError> {
    let header = Command::register(ETP_I2C_IAP_CTRL_CMD, &[]);
    let data = session.read_bytes(phase, &header, ETP_I2C_INF_LENGTH)?;
    StatusReading::from_word_response(&data)
        .ok_or_else(|| short_read(phase, ETP_I2C_INF_LENGTH, data.len()))
}

fn poll_no_errors<T: Transport>(
    session: &mut DeviceSession<T>,
    phase: Phase,
) -> Result<StatusReading, UpdateError> {
    let policy = session.config().status_policy();
    poll_status(session, phase, StatusExpectation::NoErrorFlags, policy)
}

/// Read version information; needs no mode change.
pub(crate) fn read_info<T: Transport>(
    session: &mut DeviceSession<T>,
) -> Result<String, UpdateError> {
    let phase = Phase::ReadVersion;
    let fw_version = read_register(session, phase, ETP_I2C_FW_VERSION_CMD)?;
    let module_id = read_register(session, phase, ETP_GET_MODULE_ID_CMD)?;
    let iap_version = read_register(session, phase, ETP_I2C_IAP_VERSION_CMD)?;
    info!(
        module_id = %format!("0x{:04X}", module_id),
        iap_version = %format!("0x{:04X}", iap_version),
        "Touchpad info"
    );
    Ok(version_from_word(fw_version))
}

pub(crate) fn detach<T: Transport>(session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
    write_register(session, Phase::Detach, ETP_I2C_IAP_RESET_CMD, ETP_I2C_IAP_RESET)?;
    let policy = session.config().detach_policy();
    poll_status(session, Phase::Detach, StatusExpectation::LeftMainMode, policy)?;
    session.set_mode(Mode::ForegroundUnlocked);
    Ok(())
}

pub(crate) fn attach<T: Transport>(session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
    write_register(session, Phase::Attach, ETP_I2C_IAP_RESET_CMD, ETP_I2C_IAP_RESET)?;
    write_register(session, Phase::Attach, ETP_I2C_IAP_RESET_CMD, ETP_I2C_ENABLE_REPORT)?;
    session.set_mode(Mode::Normal);
    Ok(())
}

pub(crate) fn enable_isp<T: Transport>(session: &mut DeviceSession<T>) -> Result<(), UpdateError> {
    let phase = Phase::EnableIsp;
    write_register(session, phase, ETP_I2C_IAP_CMD, ETP_I2C_IAP_PASSWORD)?;
    let echoed = read_register(session, phase, ETP_I2C_IAP_CMD)?;
    if echoed != ETP_I2C_IAP_PASSWORD {
        return Err(UpdateError::ProtocolStatus {
            phase,
            status: echoed,
            address: None,
            fault: StatusFault::PasswordCheck,
        });
    }
    poll_no_errors(session, phase)?;
    Ok(())
}

/// Check the module id and report the running firmware version.
pub(crate) fn verify_identity<T: Transport>(
    session: &mut DeviceSession<T>,
    image: &FirmwareImage,
) -> Result<(), UpdateError> {
    let phase = Phase::VerifyIdentity;
    let module_id = read_register(session, phase, ETP_GET_MODULE_ID_CMD)?;
    match image.module_id() {
        Some(expected) if expected != module_id => {
            return Err(UpdateError::ProtocolStatus {
                phase,
                status: module_id,
                address: None,
                fault: StatusFault::ModuleMismatch { expected },
            });
        }
        Some(_) => {}
        None => debug!(module_id = %format!("0x{:04X}", module_id), "Image names no module"),
    }

    let fw_version = read_register(session, phase, ETP_I2C_FW_VERSION_CMD)?;
    session.report_version(version_from_word(fw_version));
    Ok(())
}

pub(crate) fn write_chunk<T: Transport>(
    session: &mut DeviceSession<T>,
    ctx: &mut TransferContext<'_>,
    chunk: &Chunk<'_>,
) -> Result<(), UpdateError> {
    let checksum = calc_checksum(chunk.data);
    session.write_frame(
        Phase::Streaming,
        &encode_register_page(chunk.data, checksum),
        ETP_DELAY_PAGE,
    )?;
    poll_no_errors(session, Phase::Streaming)?;
    ctx.checksum = ctx.checksum.wrapping_add(checksum);
    Ok(())
}

pub(crate) fn commit<T: Transport>(
    session: &mut DeviceSession<T>,
    ctx: &TransferContext<'_>,
) -> Result<(), UpdateError> {
    let device = read_register(session, Phase::Commit, ETP_I2C_IAP_CHECKSUM_CMD)?;
    if device != ctx.checksum {
        return Err(UpdateError::ProtocolStatus {
            phase: Phase::Commit,
            status: device,
            address: None,
            fault: StatusFault::Checksum {
                expected: ctx.checksum,
            },
        });
    }
    debug!(checksum = %format!("0x{:04X}", device), "Checksum verified");
    Ok(())
}
