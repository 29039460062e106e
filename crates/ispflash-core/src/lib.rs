//! ispflash-core: in-system firmware programming for small peripheral
//! controllers.
//!
//! Two device families are supported:
//!
//! - an I2C touchpad, driven through 16-bit register commands on a raw
//!   character device (register family);
//! - a USB-hub co-processor, driven through opcode commands tunneled over
//!   USB vendor control transfers (opcode family).
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Transport**: frame I/O abstraction (character device, USB, mock)
//! - **Protocol**: constants, command encoding, status decoding
//! - **Retry**: bounded status polling
//! - **Payload**: firmware image parsing and chunking
//! - **Lock**: scoped detach/attach around risky operations
//! - **State**: transfer state machine and per-family step handlers
//! - **Events**: observer pattern for host decoupling
//! - **Session**: setup and update entry points
//!
//! # Example
//!
//! ```no_run
//! use ispflash_core::config::SessionConfig;
//! use ispflash_core::protocol::ProtocolFamily;
//! use ispflash_core::session::DeviceSession;
//! use ispflash_core::transport::UsbControlTransport;
//!
//! let transport = UsbControlTransport::open_with_ids(0x2109, 0x2817)?;
//! let mut session = DeviceSession::new(transport, SessionConfig::new(ProtocolFamily::Opcode))?;
//! println!("version {}", session.setup()?);
//! session.install(&std::fs::read("hub.bin")?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod lock;
pub mod payload;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use config::{ConfigError, QuirkKey, SessionConfig};
pub use error::{Phase, UpdateError};
pub use events::{NullObserver, RecordingObserver, TracingObserver, UpdateEvent, UpdateObserver};
pub use lock::{Mode, ModeLock};
pub use payload::{Chunk, Chunks, FirmwareError, FirmwareImage};
pub use protocol::{CommandCodec, ProtocolFamily};
pub use retry::{RetryPolicy, retry};
pub use session::DeviceSession;
pub use state::{TransferState, TransferStateMachine};
pub use transport::{MockTransport, Transport, TransportError, UsbControlTransport};

#[cfg(unix)]
pub use transport::I2cDevTransport;
