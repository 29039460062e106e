//! Event system for host decoupling.
//!
//! Hosts subscribe to progress, mode and version reports without the
//! core knowing how they are presented.

use std::sync::Mutex;

use crate::error::Phase;
use crate::lock::Mode;
use crate::state::TransferState;

/// Events emitted by a device session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// Transfer state machine moved.
    PhaseChanged {
        from: TransferState,
        to: TransferState,
    },
    /// Device mode changed.
    ModeChanged { from: Mode, to: Mode },
    /// Block `current` of blocks `0..=total` has been written.
    Progress { current: usize, total: usize },
    /// Firmware version read from the device.
    VersionReported { version: String },
    /// Transfer aborted.
    Aborted { phase: Option<Phase>, message: String },
    /// Transfer completed successfully.
    Complete,
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your host layer to receive updates.
pub trait UpdateObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &UpdateEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl UpdateObserver for NullObserver {
    fn on_event(&self, _event: &UpdateEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl UpdateObserver for TracingObserver {
    fn on_event(&self, event: &UpdateEvent) {
        match event {
            UpdateEvent::PhaseChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Transfer phase changed");
            }
            UpdateEvent::ModeChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Device mode changed");
            }
            UpdateEvent::Progress { current, total } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    100
                };
                tracing::debug!(
                    block = current,
                    last = total,
                    progress = %format!("{}%", pct),
                    "Progress"
                );
            }
            UpdateEvent::VersionReported { version } => {
                tracing::info!(version = %version, "Firmware version");
            }
            UpdateEvent::Aborted { phase, message } => match phase {
                Some(phase) => tracing::error!(phase = %phase, "Update aborted: {}", message),
                None => tracing::error!("Update aborted: {}", message),
            },
            UpdateEvent::Complete => {
                tracing::info!("Update complete");
            }
        }
    }
}

/// Observer that keeps every event, for hosts that inspect them later.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<UpdateEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far.
    pub fn events(&self) -> Vec<UpdateEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// All progress reports, in order.
    pub fn progress(&self) -> Vec<(usize, usize)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UpdateEvent::Progress { current, total } => Some((current, total)),
                _ => None,
            })
            .collect()
    }
}

impl UpdateObserver for RecordingObserver {
    fn on_event(&self, event: &UpdateEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_keeps_order() {
        let observer = RecordingObserver::new();
        observer.on_event(&UpdateEvent::Progress {
            current: 0,
            total: 1,
        });
        observer.on_event(&UpdateEvent::VersionReported {
            version: "1.2".into(),
        });
        observer.on_event(&UpdateEvent::Progress {
            current: 1,
            total: 1,
        });

        assert_eq!(observer.events().len(), 3);
        assert_eq!(observer.progress(), vec![(0, 1), (1, 1)]);
    }
}
