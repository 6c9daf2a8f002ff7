use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use ahash::{AHashMap, AHashSet};
use crossbeam_channel::Sender;
use padflow_control::{AxisKind, ControlIndex, ControlKind};

use crate::events::{ControlEvent, EngineEvent};
use crate::listeners::Listener;
use crate::{EngineError, Result};

/// Which control kinds an identification accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    Any,
    Discrete,
    Continuous,
    Axis(AxisKind),
}

impl KindFilter {
    /// Feedback controls are never accepted.
    pub fn accepts(self, kind: ControlKind) -> bool {
        match (self, kind) {
            (_, ControlKind::Feedback) => false,
            (KindFilter::Any, _) => true,
            (KindFilter::Discrete, ControlKind::Discrete) => true,
            (KindFilter::Continuous, ControlKind::Continuous(_)) => true,
            (KindFilter::Axis(want), ControlKind::Continuous(axis)) => want == axis,
            _ => false,
        }
    }
}

/// Parameters of one identification wait.
#[derive(Debug, Clone)]
pub struct IdentifyRequest {
    pub kinds: KindFilter,
    pub excluded: AHashSet<ControlIndex>,
    /// `None` waits until a gesture qualifies or the call is cancelled.
    pub timeout: Option<Duration>,
    /// Period used if the call has to start polling itself.
    pub poll_period: Duration,
}

impl Default for IdentifyRequest {
    fn default() -> Self {
        Self {
            kinds: KindFilter::Any,
            excluded: AHashSet::new(),
            timeout: None,
            poll_period: Duration::from_millis(10),
        }
    }
}

impl IdentifyRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(mut self, kinds: KindFilter) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn exclude(mut self, control: ControlIndex) -> Self {
        self.excluded.insert(control);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    pub fn accepts(&self, control: ControlIndex, kind: ControlKind) -> bool {
        self.kinds.accepts(kind) && !self.excluded.contains(&control)
    }
}

/// Recognizes a deliberate press-and-release on shaped values.
///
/// Feed it every polled [`ControlEvent`]; it returns the event that
/// completes a gesture. The returned event holds the armed extreme in its
/// previous fields and the terminal value in its current fields.
#[derive(Debug, Default)]
pub struct GestureDetector {
    armed: AHashMap<ControlIndex, ControlEvent>,
}

impl GestureDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, event: &ControlEvent) -> Option<ControlEvent> {
        let value = event.current_value;
        if value.is_nan() {
            return None;
        }
        match event.kind {
            ControlKind::Discrete => self.press_release(event, value == 1.0),
            ControlKind::Continuous(AxisKind::Absolute) => {
                self.press_release(event, value.abs() == 1.0)
            }
            ControlKind::Continuous(AxisKind::Hat) => self.press_release(event, value != 0.0),
            ControlKind::Continuous(AxisKind::Relative) => (value != 0.0).then(|| ControlEvent {
                previous_value: value,
                previous_id: event.current_id,
                ..event.clone()
            }),
            ControlKind::Feedback => None,
        }
    }

    /// Arms on `extreme`, keeping the largest magnitude seen, and qualifies
    /// when the value returns to 0.
    fn press_release(&mut self, event: &ControlEvent, extreme: bool) -> Option<ControlEvent> {
        let value = event.current_value;
        if extreme {
            let stronger = self
                .armed
                .get(&event.control)
                .map_or(true, |armed| value.abs() > armed.current_value.abs());
            if stronger {
                self.armed.insert(event.control, event.clone());
            }
            return None;
        }
        if value != 0.0 {
            return None;
        }
        let armed = self.armed.remove(&event.control)?;
        Some(ControlEvent {
            previous_value: armed.current_value,
            previous_id: armed.current_id,
            ..event.clone()
        })
    }

    pub fn reset(&mut self) {
        self.armed.clear();
    }
}

/// Listener feeding a detector and reporting the first qualifying gesture,
/// or the device failure that makes waiting pointless.
pub(crate) struct IdentifyListener {
    request: IdentifyRequest,
    detector: Mutex<GestureDetector>,
    found: Sender<Result<ControlEvent>>,
}

impl IdentifyListener {
    pub(crate) fn new(request: IdentifyRequest, found: Sender<Result<ControlEvent>>) -> Self {
        Self {
            request,
            detector: Mutex::new(GestureDetector::new()),
            found,
        }
    }
}

impl Listener for IdentifyListener {
    fn on_event(&self, event: &EngineEvent) {
        let event = match event {
            EngineEvent::Polled { event, .. } => event,
            EngineEvent::PollingHalted { controller } => {
                let _ = self.found.try_send(Err(EngineError::DeviceFailure(*controller)));
                return;
            }
            _ => return,
        };
        if !self.request.accepts(event.control, event.kind) {
            return;
        }
        let qualified = self
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .feed(event);
        if let Some(hit) = qualified {
            // First hit wins; the slot is already full otherwise.
            let _ = self.found.try_send(Ok(hit));
        }
    }
}
