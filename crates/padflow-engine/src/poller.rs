use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use padflow_control::{
    shape, ConfigSnapshot, ControlIndex, ControllerConfiguration, ControllerLayout, ValueId,
};

use crate::device::Device;
use crate::dispatch::DispatchHandle;
use crate::events::{ControlEvent, ControllerId, EngineEvent, EventMask};
use crate::listeners::ListenerRegistry;
use crate::state::ControlState;
use crate::{EngineError, Result};

/// Lifecycle of a controller's polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingState {
    Idle,
    Running { period: Duration },
    /// The device failed. Polling never restarts.
    Failed,
}

pub(crate) struct PollStatus {
    state: Mutex<PollingState>,
    detached: AtomicBool,
}

impl PollStatus {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(PollingState::Idle),
            detached: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PollingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self) -> PollingState {
        *self.lock()
    }

    pub(crate) fn begin(&self, id: ControllerId, period: Duration) -> Result<()> {
        if self.detached.load(Ordering::Acquire) {
            return Err(EngineError::IllegalState("controller is detached"));
        }
        let mut state = self.lock();
        match *state {
            PollingState::Idle => {
                *state = PollingState::Running { period };
                Ok(())
            }
            PollingState::Running { .. } => Err(EngineError::IllegalState("polling already started")),
            PollingState::Failed => Err(EngineError::DeviceFailure(id)),
        }
    }

    /// Returns true if polling was running.
    pub(crate) fn end(&self) -> bool {
        let mut state = self.lock();
        if matches!(*state, PollingState::Running { .. }) {
            *state = PollingState::Idle;
            return true;
        }
        false
    }

    pub(crate) fn fail(&self) {
        *self.lock() = PollingState::Failed;
    }

    /// Ends polling for good once the poller is released.
    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Release);
        self.end();
    }
}

/// Slot holding the snapshot the poller reads at the start of each cycle.
pub(crate) struct ConfigSlot(RwLock<ConfigSnapshot>);

impl ConfigSlot {
    pub(crate) fn new(snapshot: ConfigSnapshot) -> Self {
        Self(RwLock::new(snapshot))
    }

    #[inline]
    pub(crate) fn load(&self) -> ConfigSnapshot {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn store(&self, snapshot: ConfigSnapshot) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

/// What the activation rule asks for in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    None,
    Activate,
    Deactivate,
    /// Deactivate the previous id, then activate the current one.
    Swap,
}

pub(crate) fn transition(
    previous: Option<ValueId>,
    current: Option<ValueId>,
    force_turbo: bool,
) -> Transition {
    match (previous, current) {
        (Some(p), Some(c)) if p != c => Transition::Swap,
        (Some(_), Some(_)) if force_turbo => Transition::Activate,
        (Some(_), Some(_)) => Transition::None,
        (Some(_), None) => Transition::Deactivate,
        (None, Some(_)) => Transition::Activate,
        (None, None) => Transition::None,
    }
}

/// Samples one device and turns its values into events.
///
/// Owns the per-control state. Inside a [`crate::Runtime`] it lives on the
/// scheduler thread; standalone, [`ControllerPoller::cycle`] can be driven
/// from any loop.
pub struct ControllerPoller {
    id: ControllerId,
    device: Box<dyn Device>,
    layout: Arc<ControllerLayout>,
    config: Arc<ConfigSlot>,
    states: Vec<ControlState>,
    listeners: Arc<ListenerRegistry>,
    status: Arc<PollStatus>,
}

impl ControllerPoller {
    /// Standalone poller with its own configuration slot.
    pub fn new(id: ControllerId, device: impl Device, config: ControllerConfiguration) -> Result<Self> {
        let layout = Arc::new(device.layout().clone());
        config.ensure_matches(&layout)?;
        Ok(Self::with_shared(
            id,
            Box::new(device),
            layout,
            Arc::new(ConfigSlot::new(config.into_snapshot())),
            Arc::new(ListenerRegistry::new()),
            Arc::new(PollStatus::new()),
        ))
    }

    pub(crate) fn with_shared(
        id: ControllerId,
        device: Box<dyn Device>,
        layout: Arc<ControllerLayout>,
        config: Arc<ConfigSlot>,
        listeners: Arc<ListenerRegistry>,
        status: Arc<PollStatus>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            device,
            states: vec![ControlState::new(now); layout.len()],
            layout,
            config,
            listeners,
            status,
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn layout(&self) -> &ControllerLayout {
        &self.layout
    }

    /// Publishes a new configuration, picked up on the next cycle.
    pub fn set_configuration(&self, config: ControllerConfiguration) -> Result<()> {
        config.ensure_matches(&self.layout)?;
        self.config.store(config.into_snapshot());
        Ok(())
    }

    /// Current shaped value of `control`.
    pub fn value(&self, control: ControlIndex) -> Option<f32> {
        self.states.get(control.get()).map(|s| s.current_value)
    }

    /// Runs one poll cycle and returns the derived events.
    ///
    /// Per control the order is Deactivated, Activated, Changed, Polled.
    /// Only categories in `interest` are built.
    pub fn cycle(&mut self, now: Instant, interest: EventMask) -> Result<Vec<EngineEvent>> {
        let config = self.config.load();
        if !self.device.poll() {
            return Err(EngineError::DeviceFailure(self.id));
        }

        let mut events = Vec::new();
        for control in self.layout.controls() {
            let kind = control.kind();
            if !kind.is_polled() {
                continue;
            }
            let index = control.index();
            let Some(cfg) = config.get(index) else {
                continue;
            };
            let raw = self.device.read_raw(index);
            let value = shape(raw, cfg, kind);

            let state = &mut self.states[index.get()];
            let force_turbo = state.update(value, now, kind, cfg);
            if interest.is_empty() {
                continue;
            }

            let previous_id = cfg.value_id(state.last_value);
            let current_id = cfg.value_id(state.current_value);
            let event = ControlEvent {
                controller: self.id,
                control: index,
                name: control.shared_name().clone(),
                kind,
                user_id: cfg.user_id(),
                current_value: state.current_value,
                previous_value: state.last_value,
                current_id,
                previous_id,
                timestamp: now,
            };

            let mut derived: SmallVec<[EngineEvent; 4]> = SmallVec::new();
            if interest.contains(EventMask::ACTIVATION) {
                match transition(previous_id, current_id, force_turbo) {
                    Transition::Swap => {
                        derived.push(EngineEvent::Deactivated(event.clone()));
                        derived.push(EngineEvent::Activated(event.clone()));
                    }
                    Transition::Activate => derived.push(EngineEvent::Activated(event.clone())),
                    Transition::Deactivate => derived.push(EngineEvent::Deactivated(event.clone())),
                    Transition::None => {}
                }
            }
            if interest.contains(EventMask::CHANGED) && state.changed() {
                derived.push(EngineEvent::Changed(event.clone()));
            }
            if interest.contains(EventMask::POLLED) {
                derived.push(EngineEvent::Polled { event, raw });
            }
            events.extend(derived);
        }
        Ok(events)
    }

    /// Runs one cycle and queues its events. On device failure marks the
    /// controller failed, reports it and returns false.
    pub(crate) fn run_cycle(&mut self, now: Instant, dispatch: &DispatchHandle) -> bool {
        match self.cycle(now, self.listeners.interest()) {
            Ok(events) => {
                dispatch.submit(&self.listeners, events);
                true
            }
            Err(err) => {
                log::error!("polling halted for {}: {err}", self.layout.name());
                self.status.fail();
                dispatch.submit_one(
                    &self.listeners,
                    EngineEvent::PollingHalted { controller: self.id },
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use padflow_control::{ControlIndex, ControllerLayout};

    use super::*;
    use crate::sim::ScriptedDevice;

    const AXIS: ControlIndex = ControlIndex(0);
    const BUTTON: ControlIndex = ControlIndex(1);

    fn layout() -> ControllerLayout {
        ControllerLayout::builder("test pad")
            .axis("x")
            .button("fire")
            .feedback("rumble")
            .build()
    }

    fn poller_with(
        frames: Vec<Vec<f32>>,
        edit: impl FnOnce(&mut ControllerConfiguration),
    ) -> ControllerPoller {
        let layout = layout();
        let mut config = ControllerConfiguration::new(&layout);
        edit(&mut config);
        let (device, _handle) = ScriptedDevice::new(layout);
        ControllerPoller::new(7, device.with_frames(frames).fail_when_exhausted(), config)
            .expect("matching configuration")
    }

    fn axis_frames(values: &[f32]) -> Vec<Vec<f32>> {
        ScriptedDevice::frames_for(&layout(), AXIS, values)
    }

    fn button_frames(values: &[f32]) -> Vec<Vec<f32>> {
        ScriptedDevice::frames_for(&layout(), BUTTON, values)
    }

    fn run(poller: &mut ControllerPoller, cycles: usize, period: Duration) -> Vec<Vec<EngineEvent>> {
        let t0 = Instant::now();
        (0..cycles)
            .map(|i| {
                poller
                    .cycle(t0 + period * i as u32, EventMask::ALL)
                    .expect("device alive")
            })
            .collect()
    }

    fn for_control(events: &[EngineEvent], control: ControlIndex) -> Vec<&EngineEvent> {
        events
            .iter()
            .filter(|e| e.control_event().is_some_and(|c| c.control == control))
            .collect()
    }

    #[test]
    fn transition_table() {
        assert_eq!(transition(Some(1), Some(2), false), Transition::Swap);
        assert_eq!(transition(Some(1), Some(2), true), Transition::Swap);
        assert_eq!(transition(Some(1), Some(1), false), Transition::None);
        assert_eq!(transition(Some(1), Some(1), true), Transition::Activate);
        assert_eq!(transition(Some(1), None, false), Transition::Deactivate);
        assert_eq!(transition(Some(1), None, true), Transition::Deactivate);
        assert_eq!(transition(None, Some(1), false), Transition::Activate);
        assert_eq!(transition(None, None, true), Transition::None);
    }

    #[test]
    fn shaped_sequence_fires_single_change() {
        let mut poller = poller_with(axis_frames(&[0.02, 0.26, 0.24, -0.3]), |cfg| {
            let axis = cfg.control_mut(AXIS).unwrap();
            axis.set_granularity(0.25).unwrap();
            axis.set_dead_zone(-0.05, 0.05).unwrap();
        });
        let cycles = run(&mut poller, 4, Duration::from_millis(10));

        let shaped: Vec<f32> = cycles
            .iter()
            .map(|events| {
                for_control(events, AXIS)
                    .into_iter()
                    .find_map(|e| match e {
                        EngineEvent::Polled { event, .. } => Some(event.current_value),
                        _ => None,
                    })
                    .expect("polled event every cycle")
            })
            .collect();
        assert_eq!(shaped, [0.0, 0.25, 0.25, -0.25]);

        let changes: Vec<usize> = cycles
            .iter()
            .map(|events| {
                for_control(events, AXIS)
                    .iter()
                    .filter(|e| matches!(e, EngineEvent::Changed(_)))
                    .count()
            })
            .collect();
        assert_eq!(changes, [0, 1, 0, 1]);
    }

    #[test]
    fn events_are_ordered_per_control() {
        let mut poller = poller_with(button_frames(&[1.0, 0.0]), |cfg| {
            let button = cfg.control_mut(BUTTON).unwrap();
            button.bind_value(0.0, 10).unwrap();
            button.bind_value(1.0, 11).unwrap();
        });
        let cycles = run(&mut poller, 2, Duration::from_millis(10));
        let names: Vec<&str> = for_control(&cycles[0], BUTTON)
            .into_iter()
            .map(|e| match e {
                EngineEvent::Deactivated(_) => "deactivated",
                EngineEvent::Activated(_) => "activated",
                EngineEvent::Changed(_) => "changed",
                EngineEvent::Polled { .. } => "polled",
                _ => "other",
            })
            .collect();
        assert_eq!(names, ["deactivated", "activated", "changed", "polled"]);

        let button_events = for_control(&cycles[0], BUTTON);
        let EngineEvent::Activated(event) = button_events[1] else {
            panic!("expected activation");
        };
        assert_eq!(event.previous_id, Some(10));
        assert_eq!(event.current_id, Some(11));
    }

    #[test]
    fn unbound_transitions_fire_single_edge() {
        let mut poller = poller_with(button_frames(&[1.0, 1.0, 0.0]), |cfg| {
            cfg.control_mut(BUTTON).unwrap().bind_value(1.0, 5).unwrap();
        });
        let cycles = run(&mut poller, 3, Duration::from_millis(10));
        let activation = |events: &[EngineEvent]| -> Vec<&'static str> {
            for_control(events, BUTTON)
                .into_iter()
                .filter_map(|e| match e {
                    EngineEvent::Activated(_) => Some("on"),
                    EngineEvent::Deactivated(_) => Some("off"),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(activation(&cycles[0]), ["on"]);
        assert!(activation(&cycles[1]).is_empty());
        assert_eq!(activation(&cycles[2]), ["off"]);
    }

    #[test]
    fn turbo_repeats_after_delay() {
        let mut poller = poller_with(button_frames(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0]), |cfg| {
            let button = cfg.control_mut(BUTTON).unwrap();
            button.bind_value(1.0, 1).unwrap();
            button.set_turbo_enabled(true);
            button.set_turbo_delay(Duration::from_millis(100));
        });
        let cycles = run(&mut poller, 7, Duration::from_millis(33));
        let activations: Vec<usize> = cycles
            .iter()
            .map(|events| {
                for_control(events, BUTTON)
                    .iter()
                    .filter(|e| matches!(e, EngineEvent::Activated(_)))
                    .count()
            })
            .collect();
        assert_eq!(activations, [1, 0, 0, 0, 1, 1, 0]);
    }

    #[test]
    fn feedback_controls_are_not_polled() {
        let mut poller = poller_with(axis_frames(&[0.5]), |_| {});
        let cycles = run(&mut poller, 1, Duration::from_millis(10));
        assert!(for_control(&cycles[0], ControlIndex(2)).is_empty());
        assert_eq!(
            cycles[0]
                .iter()
                .filter(|e| matches!(e, EngineEvent::Polled { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn polled_event_carries_raw_sample() {
        let mut poller = poller_with(axis_frames(&[0.26]), |cfg| {
            cfg.control_mut(AXIS).unwrap().set_granularity(0.25).unwrap();
        });
        let cycles = run(&mut poller, 1, Duration::from_millis(10));
        let raw = cycles[0].iter().find_map(|e| match e {
            EngineEvent::Polled { event, raw } if event.control == AXIS => Some((*raw, event.current_value)),
            _ => None,
        });
        assert_eq!(raw, Some((0.26, 0.25)));
    }

    #[test]
    fn interest_limits_built_events() {
        let mut poller = poller_with(axis_frames(&[0.5]), |_| {});
        let events = poller
            .cycle(Instant::now(), EventMask::CHANGED)
            .expect("device alive");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], EngineEvent::Changed(_)));

        let mut poller = poller_with(axis_frames(&[0.5]), |_| {});
        assert!(poller
            .cycle(Instant::now(), EventMask::NONE)
            .expect("device alive")
            .is_empty());
        assert_eq!(poller.value(AXIS), Some(0.5));
    }

    #[test]
    fn new_configuration_applies_on_next_cycle() {
        let mut poller = poller_with(axis_frames(&[0.3, 0.3]), |_| {});
        let t0 = Instant::now();
        poller.cycle(t0, EventMask::NONE).expect("device alive");
        assert_eq!(poller.value(AXIS), Some(0.3));

        let mut config = ControllerConfiguration::new(poller.layout());
        config.control_mut(AXIS).unwrap().set_inverted(true);
        poller.set_configuration(config).expect("same layout");
        poller.cycle(t0, EventMask::NONE).expect("device alive");
        assert_eq!(poller.value(AXIS), Some(-0.3));
    }

    #[test]
    fn device_failure_is_reported() {
        let mut poller = poller_with(axis_frames(&[0.1]), |_| {});
        assert!(poller.cycle(Instant::now(), EventMask::ALL).is_ok());
        assert!(matches!(
            poller.cycle(Instant::now(), EventMask::ALL),
            Err(EngineError::DeviceFailure(7))
        ));
    }

    #[test]
    fn mismatched_configuration_is_rejected() {
        let (device, _handle) = ScriptedDevice::new(layout());
        let other = ControllerLayout::builder("other").button("b").build();
        let result = ControllerPoller::new(1, device, ControllerConfiguration::new(&other));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn poll_status_transitions() {
        let status = PollStatus::new();
        let period = Duration::from_millis(5);
        assert!(status.begin(1, period).is_ok());
        assert!(matches!(status.begin(1, period), Err(EngineError::IllegalState(_))));
        assert!(status.end());
        assert!(!status.end());
        status.fail();
        assert!(matches!(status.begin(1, period), Err(EngineError::DeviceFailure(1))));
        assert!(!status.end());
        assert_eq!(status.get(), PollingState::Failed);

        let status = PollStatus::new();
        status.begin(1, period).unwrap();
        status.detach();
        assert_eq!(status.get(), PollingState::Idle);
        assert!(matches!(status.begin(1, period), Err(EngineError::IllegalState(_))));
    }
}
