use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use padflow_control::{ControlIndex, ControlKind, ValueId};

use crate::calibration::Range;

/// Unique identifier of a controller attached to a runtime.
pub type ControllerId = u32;

/// Snapshot of one control for one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    pub controller: ControllerId,
    pub control: ControlIndex,
    pub name: Arc<str>,
    pub kind: ControlKind,
    pub user_id: i32,
    pub current_value: f32,
    pub previous_value: f32,
    pub current_id: Option<ValueId>,
    pub previous_id: Option<ValueId>,
    pub timestamp: Instant,
}

/// Everything the engine reports to listeners.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Fired for every polled control on every cycle. `raw` is the sample
    /// before shaping.
    Polled { event: ControlEvent, raw: f32 },
    /// The shaped value differs from the previous cycle.
    Changed(ControlEvent),
    /// A bound value became current, or turbo repeated it.
    Activated(ControlEvent),
    /// A bound value stopped being current.
    Deactivated(ControlEvent),
    CalibrationStarted { controller: ControllerId },
    CalibrationUpdated {
        controller: ControllerId,
        control: ControlIndex,
        range: Range,
    },
    CalibrationStopped { controller: ControllerId },
    /// Polling stopped because the device failed.
    PollingHalted { controller: ControllerId },
}

impl EngineEvent {
    pub fn category(&self) -> EventMask {
        match self {
            EngineEvent::Polled { .. } => EventMask::POLLED,
            EngineEvent::Changed(_) => EventMask::CHANGED,
            EngineEvent::Activated(_) | EngineEvent::Deactivated(_) => EventMask::ACTIVATION,
            EngineEvent::CalibrationStarted { .. }
            | EngineEvent::CalibrationUpdated { .. }
            | EngineEvent::CalibrationStopped { .. } => EventMask::CALIBRATION,
            EngineEvent::PollingHalted { .. } => EventMask::LIFECYCLE,
        }
    }

    pub fn controller(&self) -> ControllerId {
        match self {
            EngineEvent::Polled { event, .. }
            | EngineEvent::Changed(event)
            | EngineEvent::Activated(event)
            | EngineEvent::Deactivated(event) => event.controller,
            EngineEvent::CalibrationStarted { controller }
            | EngineEvent::CalibrationUpdated { controller, .. }
            | EngineEvent::CalibrationStopped { controller }
            | EngineEvent::PollingHalted { controller } => *controller,
        }
    }

    /// The control event carried by input events.
    pub fn control_event(&self) -> Option<&ControlEvent> {
        match self {
            EngineEvent::Polled { event, .. }
            | EngineEvent::Changed(event)
            | EngineEvent::Activated(event)
            | EngineEvent::Deactivated(event) => Some(event),
            _ => None,
        }
    }
}

/// Set of event categories a listener is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventMask(u8);

impl EventMask {
    pub const NONE: Self = Self(0);
    pub const POLLED: Self = Self(1);
    pub const CHANGED: Self = Self(1 << 1);
    pub const ACTIVATION: Self = Self(1 << 2);
    pub const CALIBRATION: Self = Self(1 << 3);
    pub const LIFECYCLE: Self = Self(1 << 4);
    pub const ALL: Self = Self(0b1_1111);

    pub(crate) const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Receiving end of an event subscription.
pub type EventReceiver = Receiver<EngineEvent>;
