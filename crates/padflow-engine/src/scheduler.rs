use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::dispatch::DispatchHandle;
use crate::events::ControllerId;
use crate::poller::ControllerPoller;
use crate::{EngineError, Result};

/// Commands accepted by the scheduler thread, handled between cycles.
pub(crate) enum Command {
    Attach(Box<ControllerPoller>),
    Start {
        id: ControllerId,
        period: Duration,
    },
    Stop {
        id: ControllerId,
        done: Option<Sender<()>>,
    },
    Detach(ControllerId),
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
struct Schedule {
    period: Duration,
    next_due: Instant,
}

struct Slot {
    poller: Box<ControllerPoller>,
    schedule: Option<Schedule>,
}

/// Handle used to send commands to the scheduler thread.
#[derive(Clone)]
pub(crate) struct SchedulerHandle {
    tx: Sender<Command>,
}

impl SchedulerHandle {
    pub(crate) fn send(&self, cmd: Command) -> Result<()> {
        self.tx.send(cmd).map_err(|_| EngineError::Disconnected)
    }
}

/// Thread driving every attached poller on its own period.
pub(crate) struct Scheduler {
    handle: SchedulerHandle,
    thread: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub(crate) fn start(dispatch: DispatchHandle) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Command>();
        let thread = thread::Builder::new()
            .name("padflow-scheduler".into())
            .spawn(move || run(&rx, &dispatch))?;
        Ok(Self {
            handle: SchedulerHandle { tx },
            thread: Some(thread),
        })
    }

    pub(crate) fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub(crate) fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.handle.tx.send(Command::Shutdown);
        if thread.join().is_err() {
            log::error!("scheduler thread panicked");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(rx: &Receiver<Command>, dispatch: &DispatchHandle) {
    log::debug!("scheduler started");
    let mut slots: AHashMap<ControllerId, Slot> = AHashMap::new();

    loop {
        let next_due = slots
            .values()
            .filter_map(|slot| slot.schedule.map(|s| s.next_due))
            .min();
        let received = match next_due {
            Some(deadline) => rx.recv_deadline(deadline),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(cmd) => handle_command(&mut slots, cmd, dispatch),
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        for slot in slots.values_mut() {
            let Some(schedule) = slot.schedule.as_mut() else {
                continue;
            };
            if schedule.next_due > now {
                continue;
            }
            if !slot.poller.run_cycle(now, dispatch) {
                slot.schedule = None;
                continue;
            }
            schedule.next_due += schedule.period;
            if schedule.next_due <= now {
                // Fell behind; skip the missed cycles.
                schedule.next_due = now + schedule.period;
            }
        }
    }
    log::debug!("scheduler stopped");
}

fn handle_command(slots: &mut AHashMap<ControllerId, Slot>, cmd: Command, dispatch: &DispatchHandle) {
    match cmd {
        Command::Attach(poller) => {
            log::debug!("attached {} as controller {}", poller.layout().name(), poller.id());
            slots.insert(
                poller.id(),
                Slot {
                    poller,
                    schedule: None,
                },
            );
        }
        Command::Start { id, period } => {
            if let Some(slot) = slots.get_mut(&id) {
                log::debug!("polling controller {id} every {period:?}");
                slot.schedule = Some(Schedule {
                    period,
                    next_due: Instant::now(),
                });
            }
        }
        Command::Stop { id, done } => {
            if let Some(slot) = slots.get_mut(&id) {
                if slot.schedule.take().is_some() {
                    log::debug!("stopped polling controller {id}");
                }
            }
            if let Some(done) = done {
                // Ack through the dispatcher so queued events land first.
                if !dispatch.flush(done.clone()) {
                    let _ = done.send(());
                }
            }
        }
        Command::Detach(id) => {
            if slots.remove(&id).is_some() {
                log::debug!("dropped poller of controller {id}");
            }
        }
        Command::Shutdown => {}
    }
}
