use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{after, bounded, never, select, unbounded, Receiver, Sender};
use padflow_control::{ConfigSnapshot, ControllerConfiguration, ControllerLayout};

use crate::calibration::{CalibrationResults, CalibrationSession};
use crate::dispatch::DispatchHandle;
use crate::events::{ControlEvent, ControllerId, EngineEvent, EventMask, EventReceiver};
use crate::identify::{IdentifyListener, IdentifyRequest};
use crate::listeners::{Listener, ListenerId, ListenerRegistry, Sink};
use crate::poller::{ConfigSlot, PollStatus, PollingState};
use crate::scheduler::{Command, SchedulerHandle};
use crate::{EngineError, Result};

enum Session {
    Idle,
    Calibrating {
        listener: ListenerId,
        session: Arc<CalibrationSession>,
    },
    Identifying,
}

pub(crate) struct Inner {
    pub(crate) id: ControllerId,
    pub(crate) layout: Arc<ControllerLayout>,
    pub(crate) listeners: Arc<ListenerRegistry>,
    pub(crate) status: Arc<PollStatus>,
    pub(crate) slot: Arc<ConfigSlot>,
    working: Mutex<ControllerConfiguration>,
    session: Mutex<Session>,
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,
    scheduler: SchedulerHandle,
    dispatch: DispatchHandle,
}

impl Inner {
    pub(crate) fn new(
        id: ControllerId,
        layout: Arc<ControllerLayout>,
        config: ControllerConfiguration,
        scheduler: SchedulerHandle,
        dispatch: DispatchHandle,
    ) -> Self {
        let (cancel_tx, cancel_rx) = bounded(1);
        Self {
            id,
            layout,
            listeners: Arc::new(ListenerRegistry::new()),
            status: Arc::new(PollStatus::new()),
            slot: Arc::new(ConfigSlot::new(config.snapshot())),
            working: Mutex::new(config),
            session: Mutex::new(Session::Idle),
            cancel_tx,
            cancel_rx,
            scheduler,
            dispatch,
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn working(&self) -> MutexGuard<'_, ControllerConfiguration> {
        self.working.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one attached controller.
///
/// Cheap to clone; every clone controls the same controller.
#[derive(Clone)]
pub struct Configurator {
    pub(crate) inner: Arc<Inner>,
}

impl Configurator {
    pub fn id(&self) -> ControllerId {
        self.inner.id
    }

    pub fn layout(&self) -> &ControllerLayout {
        &self.inner.layout
    }

    /// Registers a callback run on the dispatcher thread for every event
    /// in `mask`.
    pub fn add_listener(&self, mask: EventMask, listener: impl Listener + 'static) -> ListenerId {
        self.inner
            .listeners
            .add(mask, Sink::Callback(Arc::new(listener)))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Returns a channel receiving every event in `mask`. The subscription
    /// ends when the receiver is dropped.
    pub fn subscribe(&self, mask: EventMask) -> EventReceiver {
        let (tx, rx) = unbounded();
        self.inner.listeners.add(mask, Sink::Channel(tx));
        rx
    }

    /// Starts polling every `period`.
    pub fn start_polling(&self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(EngineError::IllegalState("polling period must be non-zero"));
        }
        self.inner.status.begin(self.inner.id, period)?;
        let sent = self.inner.scheduler.send(Command::Start {
            id: self.inner.id,
            period,
        });
        if sent.is_err() {
            self.inner.status.end();
        }
        sent
    }

    /// Cancels the next cycle. A cycle already running completes.
    pub fn stop_polling(&self) -> Result<()> {
        if !self.inner.status.end() {
            return Ok(());
        }
        self.inner.scheduler.send(Command::Stop {
            id: self.inner.id,
            done: None,
        })
    }

    /// Stops polling and waits until the scheduler has dropped the
    /// controller and its queued events are delivered.
    ///
    /// Returns false if `timeout` elapsed first. Calling it from a listener
    /// always times out.
    pub fn stop_polling_and_wait(&self, timeout: Duration) -> bool {
        if !self.inner.status.end() {
            return true;
        }
        let (done_tx, done_rx) = bounded(1);
        let stop = Command::Stop {
            id: self.inner.id,
            done: Some(done_tx),
        };
        if self.inner.scheduler.send(stop).is_err() {
            return false;
        }
        done_rx.recv_timeout(timeout).is_ok()
    }

    pub fn polling_state(&self) -> PollingState {
        self.inner.status.get()
    }

    /// Starts collecting raw value ranges. Polling must be started
    /// separately.
    pub fn start_calibrating(&self) -> Result<()> {
        let mut session = self.inner.session();
        if !matches!(*session, Session::Idle) {
            return Err(EngineError::IllegalState("a session is already active"));
        }
        let calibration = Arc::new(CalibrationSession::new(
            self.inner.id,
            &self.inner.listeners,
            self.inner.dispatch.clone(),
        ));
        let listener = self
            .inner
            .listeners
            .add(EventMask::POLLED, Sink::Callback(calibration.clone()));
        *session = Session::Calibrating {
            listener,
            session: calibration,
        };
        drop(session);

        log::debug!("calibration started on controller {}", self.inner.id);
        self.inner.dispatch.submit_one(
            &self.inner.listeners,
            EngineEvent::CalibrationStarted {
                controller: self.inner.id,
            },
        );
        Ok(())
    }

    /// Ends the calibration session and returns what it collected.
    pub fn stop_calibrating(&self) -> Result<CalibrationResults> {
        let mut session = self.inner.session();
        let (listener, calibration) = match mem::replace(&mut *session, Session::Idle) {
            Session::Calibrating { listener, session } => (listener, session),
            other => {
                *session = other;
                return Err(EngineError::IllegalState("no calibration is running"));
            }
        };
        drop(session);

        self.inner.listeners.remove(listener);
        let results = calibration.results();
        log::debug!(
            "calibration stopped on controller {} with {} ranges",
            self.inner.id,
            results.len()
        );
        self.inner.dispatch.submit_one(
            &self.inner.listeners,
            EngineEvent::CalibrationStopped {
                controller: self.inner.id,
            },
        );
        Ok(results)
    }

    /// Blocks until a control matching `request` is pressed and released.
    ///
    /// Starts polling if it is not running and stops it again on return.
    /// Returns `Ok(None)` on timeout and [`EngineError::Interrupted`] when
    /// [`Configurator::cancel_identification`] is called.
    pub fn identify_control(&self, request: IdentifyRequest) -> Result<Option<ControlEvent>> {
        {
            let mut session = self.inner.session();
            if !matches!(*session, Session::Idle) {
                return Err(EngineError::IllegalState("a session is already active"));
            }
            while self.inner.cancel_rx.try_recv().is_ok() {}
            *session = Session::Identifying;
        }
        let mut guard = IdentifyGuard {
            inner: &*self.inner,
            listener: None,
            started_polling: false,
        };

        let (found_tx, found_rx) = bounded(1);
        let timeout = request.timeout;
        let period = request.poll_period;
        guard.listener = Some(self.inner.listeners.add(
            EventMask::POLLED | EventMask::LIFECYCLE,
            Sink::Callback(Arc::new(IdentifyListener::new(request, found_tx))),
        ));
        match self.start_polling(period) {
            Ok(()) => guard.started_polling = true,
            Err(EngineError::IllegalState(_)) if self.polling_state() != PollingState::Idle => {}
            Err(err) => return Err(err),
        }

        let deadline = timeout.map_or_else(never, after);
        select! {
            recv(found_rx) -> hit => match hit {
                Ok(result) => result.map(Some),
                Err(_) => Err(EngineError::Disconnected),
            },
            recv(self.inner.cancel_rx) -> _ => Err(EngineError::Interrupted),
            recv(deadline) -> _ => Ok(None),
        }
    }

    /// Interrupts a running [`Configurator::identify_control`]. Returns
    /// false if none was running.
    pub fn cancel_identification(&self) -> bool {
        let session = self.inner.session();
        if !matches!(*session, Session::Identifying) {
            return false;
        }
        let _ = self.inner.cancel_tx.try_send(());
        true
    }

    /// Copy of the working configuration.
    pub fn configuration(&self) -> ControllerConfiguration {
        self.inner.working().clone()
    }

    /// The configuration the poller currently reads.
    pub fn snapshot(&self) -> ConfigSnapshot {
        self.inner.slot.load()
    }

    /// Applies `f` to a copy of the working configuration and publishes it
    /// if `f` succeeds. On error nothing changes.
    pub fn update_configuration<R>(
        &self,
        f: impl FnOnce(&mut ControllerConfiguration) -> padflow_control::Result<R>,
    ) -> Result<R> {
        let mut working = self.inner.working();
        let mut next = working.clone();
        let value = f(&mut next)?;
        self.inner.slot.store(next.snapshot());
        *working = next;
        Ok(value)
    }

    /// Replaces the configuration. It must belong to this controller's
    /// layout.
    pub fn set_configuration(&self, config: ControllerConfiguration) -> Result<()> {
        config.ensure_matches(&self.inner.layout)?;
        let mut working = self.inner.working();
        self.inner.slot.store(config.snapshot());
        *working = config;
        Ok(())
    }
}

struct IdentifyGuard<'a> {
    inner: &'a Inner,
    listener: Option<ListenerId>,
    started_polling: bool,
}

impl Drop for IdentifyGuard<'_> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.inner.listeners.remove(listener);
        }
        if self.started_polling && self.inner.status.end() {
            let _ = self.inner.scheduler.send(Command::Stop {
                id: self.inner.id,
                done: None,
            });
        }
        *self.inner.session() = Session::Idle;
    }
}
