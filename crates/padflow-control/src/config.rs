use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use smallvec::SmallVec;

use crate::control::{ControlIndex, ControllerLayout, Fingerprint};
use crate::{ConfigError, Result};

/// Arbitrary user id bound to an exact control value.
pub type ValueId = i32;

/// Reserved id meaning "no binding". Never accepted by setters.
pub const UNBOUND_ID: ValueId = i32::MIN;

/// Smallest non-zero granularity. Finer bins would overflow the bin index.
pub const MIN_GRANULARITY: f32 = 1e-6;

/// Closed sub-range of values that collapses to neutral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeadZone {
    lower: f32,
    upper: f32,
}

impl DeadZone {
    pub fn new(lower: f32, upper: f32) -> Result<Self> {
        check_closed("dead zone lower bound", lower, -1.0, 1.0)?;
        check_closed("dead zone upper bound", upper, -1.0, 1.0)?;
        if lower > upper {
            return Err(ConfigError::InvertedDeadZone { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> f32 {
        self.lower
    }

    pub fn upper(&self) -> f32 {
        self.upper
    }

    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// An exact value to id association.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueBinding {
    pub value: f32,
    pub id: ValueId,
}

/// Tuning parameters of a single control.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfiguration {
    dead_zone: Option<DeadZone>,
    granularity: Option<f32>,
    center: f32,
    inverted: bool,
    turbo_enabled: bool,
    turbo_delay: Duration,
    bindings: SmallVec<[ValueBinding; 4]>,
    user_id: i32,
}

impl Default for ControlConfiguration {
    fn default() -> Self {
        Self {
            dead_zone: None,
            granularity: None,
            center: 0.0,
            inverted: false,
            turbo_enabled: false,
            turbo_delay: Duration::ZERO,
            bindings: SmallVec::new(),
            user_id: 0,
        }
    }
}

impl ControlConfiguration {
    pub fn dead_zone(&self) -> Option<DeadZone> {
        self.dead_zone
    }

    pub fn set_dead_zone(&mut self, lower: f32, upper: f32) -> Result<()> {
        self.dead_zone = Some(DeadZone::new(lower, upper)?);
        Ok(())
    }

    pub fn clear_dead_zone(&mut self) {
        self.dead_zone = None;
    }

    pub fn granularity(&self) -> Option<f32> {
        self.granularity
    }

    /// Sets the bin width. Zero disables binning; otherwise it must be
    /// between [`MIN_GRANULARITY`] and 1.
    pub fn set_granularity(&mut self, granularity: f32) -> Result<()> {
        if granularity == 0.0 {
            self.granularity = None;
            return Ok(());
        }
        check_closed("granularity", granularity, MIN_GRANULARITY, 1.0)?;
        self.granularity = Some(granularity);
        Ok(())
    }

    pub fn clear_granularity(&mut self) {
        self.granularity = None;
    }

    pub fn center(&self) -> f32 {
        self.center
    }

    pub fn set_center(&mut self, center: f32) -> Result<()> {
        if !(center > -1.0 && center < 1.0) {
            return Err(ConfigError::OutOfOpenRange {
                field: "center value",
                value: center,
                min: -1.0,
                max: 1.0,
            });
        }
        self.center = center;
        Ok(())
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    pub fn is_turbo_enabled(&self) -> bool {
        self.turbo_enabled
    }

    pub fn set_turbo_enabled(&mut self, enabled: bool) {
        self.turbo_enabled = enabled;
    }

    pub fn turbo_delay(&self) -> Duration {
        self.turbo_delay
    }

    pub fn set_turbo_delay(&mut self, delay: Duration) {
        self.turbo_delay = delay;
    }

    pub fn user_id(&self) -> i32 {
        self.user_id
    }

    pub fn set_user_id(&mut self, id: i32) {
        self.user_id = id;
    }

    /// Binds `value` to `id`, returning the id it replaced.
    pub fn bind_value(&mut self, value: f32, id: ValueId) -> Result<Option<ValueId>> {
        check_closed("bound value", value, -1.0, 1.0)?;
        if id == UNBOUND_ID {
            return Err(ConfigError::ReservedId(id));
        }
        let key = value_key(value);
        if let Some(binding) = self.bindings.iter_mut().find(|b| value_key(b.value) == key) {
            return Ok(Some(std::mem::replace(&mut binding.id, id)));
        }
        self.bindings.push(ValueBinding { value, id });
        Ok(None)
    }

    pub fn unbind_value(&mut self, value: f32) -> Option<ValueId> {
        let key = value_key(value);
        let pos = self.bindings.iter().position(|b| value_key(b.value) == key)?;
        Some(self.bindings.remove(pos).id)
    }

    pub fn clear_bindings(&mut self) {
        self.bindings.clear();
    }

    /// Looks up the id bound to exactly `value`.
    #[inline]
    pub fn value_id(&self, value: f32) -> Option<ValueId> {
        let key = value_key(value);
        self.bindings
            .iter()
            .find(|b| value_key(b.value) == key)
            .map(|b| b.id)
    }

    pub fn bindings(&self) -> &[ValueBinding] {
        &self.bindings
    }
}

/// Bit pattern used for exact matching. `-0.0` and `0.0` share a key.
#[inline]
fn value_key(value: f32) -> u32 {
    if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

fn check_closed(field: &'static str, value: f32, min: f32, max: f32) -> Result<()> {
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// Configuration of every control of one controller, in layout order.
///
/// Not synchronized. Share it across threads through [`ConfigSnapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfiguration {
    fingerprint: Fingerprint,
    controls: Vec<ControlConfiguration>,
}

impl ControllerConfiguration {
    /// Creates a default configuration for every control of `layout`.
    pub fn new(layout: &ControllerLayout) -> Self {
        Self {
            fingerprint: layout.fingerprint(),
            controls: vec![ControlConfiguration::default(); layout.len()],
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    #[inline]
    pub fn get(&self, index: ControlIndex) -> Option<&ControlConfiguration> {
        self.controls.get(index.get())
    }

    pub fn control(&self, index: ControlIndex) -> Result<&ControlConfiguration> {
        self.get(index).ok_or(ConfigError::UnknownControl(index))
    }

    pub fn control_mut(&mut self, index: ControlIndex) -> Result<&mut ControlConfiguration> {
        self.controls
            .get_mut(index.get())
            .ok_or(ConfigError::UnknownControl(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ControlIndex, &ControlConfiguration)> {
        self.controls
            .iter()
            .enumerate()
            .map(|(i, c)| (ControlIndex::from(i), c))
    }

    /// Checks that this configuration was built for `layout`.
    pub fn ensure_matches(&self, layout: &ControllerLayout) -> Result<()> {
        if self.fingerprint != layout.fingerprint() || self.controls.len() != layout.len() {
            return Err(ConfigError::FingerprintMismatch {
                expected: layout.fingerprint(),
                actual: self.fingerprint,
            });
        }
        Ok(())
    }

    /// Deep, independent, read-only copy.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot(Arc::new(self.clone()))
    }

    pub fn into_snapshot(self) -> ConfigSnapshot {
        ConfigSnapshot(Arc::new(self))
    }
}

/// Immutable, cheaply clonable view of a [`ControllerConfiguration`].
///
/// It only dereferences to a shared reference, so no mutator is reachable.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot(Arc<ControllerConfiguration>);

impl ConfigSnapshot {
    /// Returns a mutable deep copy.
    pub fn to_mutable(&self) -> ControllerConfiguration {
        (*self.0).clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for ConfigSnapshot {
    type Target = ControllerConfiguration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
