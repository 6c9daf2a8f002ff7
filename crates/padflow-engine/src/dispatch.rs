use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::events::EngineEvent;
use crate::listeners::ListenerRegistry;

enum Job {
    Deliver {
        registry: Arc<ListenerRegistry>,
        events: Vec<EngineEvent>,
    },
    /// Acknowledges once every earlier job has been delivered.
    Flush(Sender<()>),
    Shutdown,
}

/// Cheap handle used to queue events for delivery.
#[derive(Clone)]
pub(crate) struct DispatchHandle {
    tx: Sender<Job>,
}

impl DispatchHandle {
    /// Queues `events` for `registry`. Never blocks.
    pub(crate) fn submit(&self, registry: &Arc<ListenerRegistry>, events: Vec<EngineEvent>) -> bool {
        if events.is_empty() {
            return true;
        }
        self.tx
            .send(Job::Deliver {
                registry: registry.clone(),
                events,
            })
            .is_ok()
    }

    pub(crate) fn submit_one(&self, registry: &Arc<ListenerRegistry>, event: EngineEvent) -> bool {
        self.submit(registry, vec![event])
    }

    /// Sends on `done` after everything queued so far has been delivered.
    pub(crate) fn flush(&self, done: Sender<()>) -> bool {
        self.tx.send(Job::Flush(done)).is_ok()
    }
}

/// Single thread running every listener callback, in submission order.
pub(crate) struct Dispatcher {
    handle: DispatchHandle,
    thread: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub(crate) fn start() -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let thread = thread::Builder::new()
            .name("padflow-dispatch".into())
            .spawn(move || run(&rx))?;
        Ok(Self {
            handle: DispatchHandle { tx },
            thread: Some(thread),
        })
    }

    pub(crate) fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Delivers everything already queued, then stops the thread.
    pub(crate) fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.handle.tx.send(Job::Shutdown);
        if thread.join().is_err() {
            log::error!("dispatcher thread panicked");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(rx: &Receiver<Job>) {
    log::debug!("dispatcher started");
    while let Ok(job) = rx.recv() {
        match job {
            Job::Deliver { registry, events } => {
                for event in &events {
                    registry.deliver(event);
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
            Job::Shutdown => break,
        }
    }
    log::debug!("dispatcher stopped");
}
