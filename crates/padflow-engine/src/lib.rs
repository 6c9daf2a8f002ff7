//! Polling, event derivation, calibration and control identification.
//!
//! ```text
//! Device ──► Scheduler ──► Poller ──► Dispatcher ──► Listeners
//!            (1 thread)   (shape,     (1 thread)     (callbacks,
//!                          state)                     channels)
//! ```
//!
//! A [`Runtime`] owns both threads. Every attached device gets a
//! [`Configurator`] handle that exposes polling, configuration,
//! calibration and identification for that controller.

mod calibration;
mod configurator;
mod device;
mod dispatch;
mod events;
mod identify;
mod listeners;
mod poller;
mod runtime;
mod scheduler;
pub mod sim;
mod state;

use thiserror::Error;

pub use padflow_control as control;

pub use crate::calibration::{CalibrationResults, Range};
pub use crate::configurator::Configurator;
pub use crate::device::Device;
pub use crate::events::{ControlEvent, ControllerId, EngineEvent, EventMask, EventReceiver};
pub use crate::identify::{GestureDetector, IdentifyRequest, KindFilter};
pub use crate::listeners::{Listener, ListenerId};
pub use crate::poller::{ControllerPoller, PollingState};
pub use crate::runtime::Runtime;

/// Error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The call is not allowed in the current engine state. Nothing changed.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
    /// The device reported a failed poll; polling is halted for good.
    #[error("device failure on controller {0}")]
    DeviceFailure(ControllerId),
    /// A blocking wait was cancelled from another thread.
    #[error("interrupted")]
    Interrupted,
    /// The runtime threads are gone.
    #[error("runtime disconnected")]
    Disconnected,
    /// A configuration value or layout check failed.
    #[error("configuration error: {0}")]
    Config(#[from] padflow_control::ConfigError),
    /// A runtime thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Convenient result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
