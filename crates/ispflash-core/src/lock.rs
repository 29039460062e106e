//! Scoped update-mode lock.
//!
//! [`ModeLock::enter`] detaches the device from normal mode; releasing the
//! lock attaches it again. Release runs on every exit path: explicitly
//! through [`ModeLock::release`] or [`ModeLock::run`], or best-effort on drop.

use std::fmt;
use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use crate::error::UpdateError;
use crate::session::DeviceSession;
use crate::state::handlers;
use crate::transport::Transport;

/// Operating mode of the device as last driven by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    /// Detached, ISP commands accepted.
    ForegroundUnlocked,
    /// Streaming to the background bank.
    BackgroundUpdate,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Normal => write!(f, "normal"),
            Mode::ForegroundUnlocked => write!(f, "foreground-unlocked"),
            Mode::BackgroundUpdate => write!(f, "background-update"),
        }
    }
}

/// Exclusive hold on a session outside normal mode.
pub struct ModeLock<'s, T: Transport> {
    session: &'s mut DeviceSession<T>,
    released: bool,
}

impl<'s, T: Transport> ModeLock<'s, T> {
    /// Detach the device. Fails if it does not leave normal mode, or if the
    /// session is already outside it.
    pub fn enter(session: &'s mut DeviceSession<T>) -> Result<Self, UpdateError> {
        let mode = session.mode();
        if mode != Mode::Normal {
            return Err(UpdateError::LockHeld { mode });
        }
        handlers::detach(session)?;
        debug!(mode = %session.mode(), "Mode lock acquired");
        Ok(Self {
            session,
            released: false,
        })
    }

    /// Attach the device back to normal mode.
    pub fn release(mut self) -> Result<(), UpdateError> {
        self.released = true;
        handlers::attach(&mut *self.session)
    }

    /// Run `op` under the lock and release it afterwards.
    ///
    /// If both fail, the result is [`UpdateError::Release`] carrying both.
    pub fn run<R>(
        mut self,
        op: impl FnOnce(&mut DeviceSession<T>) -> Result<R, UpdateError>,
    ) -> Result<R, UpdateError> {
        let guarded = op(&mut *self.session);
        let released = self.release();
        UpdateError::combine(guarded, released)
    }
}

impl<T: Transport> Deref for ModeLock<'_, T> {
    type Target = DeviceSession<T>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<T: Transport> DerefMut for ModeLock<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<T: Transport> Drop for ModeLock<'_, T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = handlers::attach(&mut *self.session) {
            warn!(error = %e, "Failed to return device to normal mode");
        }
    }
}
