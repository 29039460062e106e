//! Protocol constants for both command families.

use std::time::Duration;

// ============================================================================
// Opcode family: I2C tunneled through USB vendor control transfers
// ============================================================================

/// Vendor request carrying an I2C write.
pub const I2C_WRITE_REQUEST: u8 = 0xB2;
/// Vendor request carrying an I2C read.
pub const I2C_READ_REQUEST: u8 = 0xA5;
/// Control transfer timeout.
pub const USB_TIMEOUT: Duration = Duration::from_millis(3000);

/// Settle time after every tunneled write.
pub const I2C_DELAY_AFTER_SEND: Duration = Duration::from_millis(5);
/// Extra wait before the identity response is valid.
pub const IDENTITY_RESPONSE_DELAY: Duration = Duration::from_millis(200);
/// Extra wait before the version response is valid.
pub const VERSION_RESPONSE_DELAY: Duration = Duration::from_millis(300);

/// Foreground controller slave address.
pub const UC_FOREGROUND_SLAVE_ADDR: u8 = 0x3A;
/// Command opcode on the foreground controller.
pub const UC_FOREGROUND_OPCODE: u8 = 0x33;
/// ISP data streaming opcode.
pub const UC_FOREGROUND_ISP_DATA_OPCODE: u8 = 0x34;
/// Status register sub-address.
pub const UC_STATUS_SUB_ADDR: u8 = 0x31;
/// Version response sub-address.
pub const UC_VERSION_SUB_ADDR: u8 = 0x00;

/// Slave address that accepts the detach request.
pub const UC_DETACH_SLAVE_ADDR: u8 = 0x6A;
/// Sub-address that accepts the detach request.
pub const UC_DETACH_SUB_ADDR: u8 = 0x31;

// Command bytes written to UC_FOREGROUND_OPCODE
pub const CMD_ENABLE_ISP: u8 = 0x01;
pub const CMD_REQUEST_IDENTITY: u8 = 0x02;
pub const CMD_VERIFY_IDENTITY: u8 = 0x03;
pub const CMD_READ_VERSION: u8 = 0x04;
pub const CMD_BEGIN_BACKGROUND_UPDATE: u8 = 0x05;
pub const CMD_FINISH_UPDATE: u8 = 0x06;
pub const CMD_EXIT_BACKGROUND: u8 = 0x07;
pub const CMD_ATTACH: u8 = 0x08;

// Detach command byte written to UC_DETACH_SLAVE_ADDR
pub const CMD_DETACH: u8 = 0x03;

/// Status: idle, last command accepted.
pub const STATUS_ACCEPTED: u8 = 0x11;
/// Status: last command failed, terminal.
pub const STATUS_FAILED: u8 = 0xBB;

/// Largest ISP packet the co-processor accepts.
pub const ISP_PACKET_SIZE: usize = 32;
/// Default streamed block size.
pub const ISP_DATA_BLOCKSIZE: u16 = 30;
/// Bytes in the identity response.
pub const IDENTITY_RESPONSE_LEN: usize = 6;
/// Bytes in the version response.
pub const VERSION_RESPONSE_LEN: usize = 7;

// ============================================================================
// Register family: touchpad IAP over a raw I2C character device
// ============================================================================

/// Register responses are always this long.
pub const ETP_I2C_INF_LENGTH: usize = 2;
/// Firmware page, the unit of block transfer.
pub const FW_PAGE_SIZE: usize = 64;

pub const ETP_I2C_IAP_VERSION_CMD: u16 = 0x0111;
pub const ETP_I2C_FW_VERSION_CMD: u16 = 0x0102;
pub const ETP_I2C_IAP_CHECKSUM_CMD: u16 = 0x0315;
pub const ETP_GET_MODULE_ID_CMD: u16 = 0x0101;

pub const ETP_I2C_IAP_RESET_CMD: u16 = 0x0314;
pub const ETP_I2C_IAP_RESET: u16 = 0xF0F0;
pub const ETP_I2C_IAP_CTRL_CMD: u16 = 0x0310;
pub const ETP_I2C_MAIN_MODE_ON: u16 = 1 << 9;
pub const ETP_I2C_IAP_CMD: u16 = 0x0311;
pub const ETP_I2C_IAP_PASSWORD: u16 = 0x1EA5;
pub const ETP_I2C_ENABLE_REPORT: u16 = 0x0800;

/// Register receiving firmware pages (`IAP_REG_L`, `IAP_REG_H`).
pub const ETP_I2C_IAP_REG: u16 = 0x0601;

pub const ETP_FW_IAP_INTF_ERR: u16 = 1 << 4;
pub const ETP_FW_IAP_PAGE_ERR: u16 = 1 << 5;
pub const ETP_FW_IAP_CHECK_PW: u16 = 1 << 7;
pub const ETP_FW_IAP_LAST_FIT: u16 = 1 << 9;

/// Word offset of the IAP start address in the image header.
pub const ETP_IAP_START_ADDR: usize = 0x0083;

/// Settle time after reset and password writes.
pub const ETP_DELAY_RESET: Duration = Duration::from_millis(30);
/// Settle time after a page write.
pub const ETP_DELAY_PAGE: Duration = Duration::from_millis(35);
