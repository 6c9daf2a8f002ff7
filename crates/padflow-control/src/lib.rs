mod config;
mod control;
mod transform;

use thiserror::Error;

pub use crate::config::{
    ConfigSnapshot, ControlConfiguration, ControllerConfiguration, DeadZone,
    ValueBinding, ValueId, MIN_GRANULARITY, UNBOUND_ID,
};
pub use crate::control::{
    AxisKind, Control, ControlGroup, ControlIndex, ControlKind, ControllerLayout,
    Fingerprint, LayoutBuilder,
};
pub use crate::transform::{clamp, collapse_dead_zone, invert, quantize, recenter, shape};

/// Error type for configuration values and layout checks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A numeric setting fell outside its closed range.
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    /// A numeric setting fell outside its open range.
    #[error("{field} must be strictly between {min} and {max}, got {value}")]
    OutOfOpenRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    /// Dead zone bounds were given in the wrong order.
    #[error("dead zone lower bound {lower} exceeds upper bound {upper}")]
    InvertedDeadZone { lower: f32, upper: f32 },
    /// The reserved "unbound" id was used as a binding.
    #[error("value id {0} is reserved")]
    ReservedId(ValueId),
    /// A control index outside the layout was addressed.
    #[error("unknown control index: {0}")]
    UnknownControl(ControlIndex),
    /// A configuration was built for a different layout.
    #[error("fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch {
        expected: Fingerprint,
        actual: Fingerprint,
    },
}

/// Convenient result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
