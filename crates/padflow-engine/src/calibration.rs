use std::sync::{Arc, Mutex, PoisonError, Weak};

use ahash::AHashMap;
use padflow_control::ControlIndex;

use crate::dispatch::DispatchHandle;
use crate::events::{ControllerId, EngineEvent};
use crate::listeners::{Listener, ListenerRegistry};

/// Observed interval of raw values for one control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    low: f32,
    high: f32,
}

impl Range {
    /// A range holding only `value`.
    pub fn new(value: f32) -> Self {
        Self {
            low: value,
            high: value,
        }
    }

    pub fn low(&self) -> f32 {
        self.low
    }

    pub fn high(&self) -> f32 {
        self.high
    }

    pub fn is_singularity(&self) -> bool {
        self.low == self.high
    }

    pub fn size(&self) -> f32 {
        self.high - self.low
    }

    /// Widens the range to cover `value`. Returns true if it grew.
    pub fn include(&mut self, value: f32) -> bool {
        if value < self.low {
            self.low = value;
            true
        } else if value > self.high {
            self.high = value;
            true
        } else {
            false
        }
    }
}

/// Ranges collected during a calibration session, keyed by control.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationResults {
    ranges: AHashMap<ControlIndex, Range>,
}

impl CalibrationResults {
    pub fn range(&self, control: ControlIndex) -> Option<Range> {
        self.ranges.get(&control).copied()
    }

    /// Ranges in control order.
    pub fn iter(&self) -> impl Iterator<Item = (ControlIndex, Range)> + '_ {
        let mut ranges: Vec<_> = self.ranges.iter().map(|(c, r)| (*c, *r)).collect();
        ranges.sort_by_key(|(c, _)| *c);
        ranges.into_iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Feeds one raw sample. Returns the new range if it changed.
    ///
    /// NaN and infinite samples are ignored.
    pub fn observe(&mut self, control: ControlIndex, value: f32) -> Option<Range> {
        if !value.is_finite() {
            return None;
        }
        match self.ranges.get_mut(&control) {
            Some(range) => range.include(value).then_some(*range),
            None => {
                let range = Range::new(value);
                self.ranges.insert(control, range);
                Some(range)
            }
        }
    }
}

/// Listener collecting raw polled values while a calibration runs.
pub(crate) struct CalibrationSession {
    controller: ControllerId,
    results: Mutex<CalibrationResults>,
    listeners: Weak<ListenerRegistry>,
    dispatch: DispatchHandle,
}

impl CalibrationSession {
    pub(crate) fn new(
        controller: ControllerId,
        listeners: &Arc<ListenerRegistry>,
        dispatch: DispatchHandle,
    ) -> Self {
        Self {
            controller,
            results: Mutex::new(CalibrationResults::default()),
            listeners: Arc::downgrade(listeners),
            dispatch,
        }
    }

    pub(crate) fn results(&self) -> CalibrationResults {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Listener for CalibrationSession {
    fn on_event(&self, event: &EngineEvent) {
        let EngineEvent::Polled { event, raw } = event else {
            return;
        };
        if event.controller != self.controller {
            return;
        }
        let updated = self
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(event.control, *raw);
        let (Some(range), Some(listeners)) = (updated, self.listeners.upgrade()) else {
            return;
        };
        self.dispatch.submit_one(
            &listeners,
            EngineEvent::CalibrationUpdated {
                controller: self.controller,
                control: event.control,
                range,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_grow_monotonically() {
        let mut results = CalibrationResults::default();
        let axis = ControlIndex(0);
        assert_eq!(results.observe(axis, 0.1), Some(Range::new(0.1)));
        assert!(results.range(axis).unwrap().is_singularity());
        assert!(results.observe(axis, 0.05).is_some());
        assert!(results.observe(axis, 0.08).is_none());
        let grown = results.observe(axis, 0.9).unwrap();
        assert_eq!((grown.low(), grown.high()), (0.05, 0.9));
        assert!((grown.size() - 0.85).abs() < 1e-6);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn non_finite_samples_are_ignored() {
        let mut results = CalibrationResults::default();
        let axis = ControlIndex(2);
        assert!(results.observe(axis, f32::NAN).is_none());
        assert!(results.is_empty());
        results.observe(axis, -0.5);
        assert!(results.observe(axis, f32::INFINITY).is_none());
        assert!(results.observe(axis, f32::NEG_INFINITY).is_none());
        assert_eq!(results.range(axis), Some(Range::new(-0.5)));
    }

    #[test]
    fn iter_is_in_control_order() {
        let mut results = CalibrationResults::default();
        results.observe(ControlIndex(3), 1.0);
        results.observe(ControlIndex(1), 0.0);
        let order: Vec<ControlIndex> = results.iter().map(|(c, _)| c).collect();
        assert_eq!(order, [ControlIndex(1), ControlIndex(3)]);
    }
}
