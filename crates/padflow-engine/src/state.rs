use std::time::Instant;

use padflow_control::{ControlConfiguration, ControlKind};

/// Rolling history of one control. Only the poller touches it.
#[derive(Debug, Clone)]
pub(crate) struct ControlState {
    pub(crate) current_value: f32,
    pub(crate) current_timestamp: Instant,
    pub(crate) last_value: f32,
    pub(crate) last_timestamp: Instant,
    turbo_started: Option<Instant>,
}

impl ControlState {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            current_value: 0.0,
            current_timestamp: now,
            last_value: 0.0,
            last_timestamp: now,
            turbo_started: None,
        }
    }

    /// Shifts current into previous and stores `value`.
    ///
    /// Returns true when turbo should re-fire the current activation.
    pub(crate) fn update(
        &mut self,
        value: f32,
        now: Instant,
        kind: ControlKind,
        config: &ControlConfiguration,
    ) -> bool {
        self.last_value = self.current_value;
        self.last_timestamp = self.current_timestamp;
        self.current_value = value;
        self.current_timestamp = now;

        if kind.is_discrete() && value == 1.0 {
            if self.turbo_started.is_none() {
                self.turbo_started = Some(now);
            }
        } else {
            self.turbo_started = None;
        }
        self.turbo_due(config, now)
    }

    /// Once the delay has elapsed since the press, every held cycle fires.
    fn turbo_due(&self, config: &ControlConfiguration, now: Instant) -> bool {
        if !config.is_turbo_enabled() || self.current_value != 1.0 {
            return false;
        }
        let Some(started) = self.turbo_started else {
            return false;
        };
        let delay = config.turbo_delay();
        delay.is_zero() || now.duration_since(started) >= delay
    }

    pub(crate) fn changed(&self) -> bool {
        // NaN samples never compare equal; treat two NaNs as unchanged.
        self.current_value != self.last_value
            && !(self.current_value.is_nan() && self.last_value.is_nan())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use padflow_control::AxisKind;

    use super::*;

    fn turbo(delay_ms: u64) -> ControlConfiguration {
        let mut cfg = ControlConfiguration::default();
        cfg.set_turbo_enabled(true);
        cfg.set_turbo_delay(Duration::from_millis(delay_ms));
        cfg
    }

    #[test]
    fn update_shifts_history() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(10);
        let mut state = ControlState::new(t0);
        let cfg = ControlConfiguration::default();
        state.update(0.5, t1, ControlKind::Continuous(AxisKind::Absolute), &cfg);
        assert_eq!(state.last_value, 0.0);
        assert_eq!(state.current_value, 0.5);
        assert_eq!(state.last_timestamp, t0);
        assert_eq!(state.current_timestamp, t1);
        assert!(state.changed());
    }

    #[test]
    fn turbo_fires_every_held_cycle_after_delay() {
        let t0 = Instant::now();
        let cfg = turbo(100);
        let mut state = ControlState::new(t0);
        let fired: Vec<bool> = (0..9)
            .map(|cycle| {
                let now = t0 + Duration::from_millis(33 * cycle);
                state.update(1.0, now, ControlKind::Discrete, &cfg)
            })
            .collect();
        assert_eq!(
            fired,
            [false, false, false, false, true, true, true, true, true]
        );
    }

    #[test]
    fn zero_delay_fires_every_held_cycle() {
        let t0 = Instant::now();
        let cfg = turbo(0);
        let mut state = ControlState::new(t0);
        assert!(state.update(1.0, t0, ControlKind::Discrete, &cfg));
        assert!(state.update(1.0, t0 + Duration::from_millis(1), ControlKind::Discrete, &cfg));
        assert!(!state.update(0.0, t0 + Duration::from_millis(2), ControlKind::Discrete, &cfg));
    }

    #[test]
    fn release_clears_timer() {
        let t0 = Instant::now();
        let cfg = turbo(50);
        let mut state = ControlState::new(t0);
        state.update(1.0, t0, ControlKind::Discrete, &cfg);
        state.update(0.0, t0 + Duration::from_millis(40), ControlKind::Discrete, &cfg);
        assert!(!state.update(1.0, t0 + Duration::from_millis(60), ControlKind::Discrete, &cfg));
        assert!(state.update(1.0, t0 + Duration::from_millis(110), ControlKind::Discrete, &cfg));
    }

    #[test]
    fn turbo_ignores_axes() {
        let t0 = Instant::now();
        let cfg = turbo(0);
        let mut state = ControlState::new(t0);
        let axis = ControlKind::Continuous(AxisKind::Absolute);
        assert!(!state.update(1.0, t0, axis, &cfg));
    }

    #[test]
    fn nan_to_nan_is_not_a_change() {
        let t0 = Instant::now();
        let cfg = ControlConfiguration::default();
        let mut state = ControlState::new(t0);
        let wheel = ControlKind::Continuous(AxisKind::Relative);
        state.update(f32::NAN, t0, wheel, &cfg);
        assert!(state.changed());
        state.update(f32::NAN, t0, wheel, &cfg);
        assert!(!state.changed());
    }
}
