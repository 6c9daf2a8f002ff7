use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crossbeam_channel::Sender;

use crate::events::{EngineEvent, EventMask};

/// Handle returned on registration, used to remove the listener.
pub type ListenerId = u64;

/// Callback invoked on the dispatcher thread.
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

impl<F> Listener for F
where
    F: Fn(&EngineEvent) + Send + Sync,
{
    fn on_event(&self, event: &EngineEvent) {
        self(event);
    }
}

#[derive(Clone)]
pub(crate) enum Sink {
    Callback(Arc<dyn Listener>),
    Channel(Sender<EngineEvent>),
}

#[derive(Clone)]
struct Entry {
    id: ListenerId,
    mask: EventMask,
    sink: Sink,
}

/// Copy-on-write list of listeners of one controller.
///
/// Writers clone the list and swap it in; delivery iterates a snapshot
/// without holding the lock.
pub(crate) struct ListenerRegistry {
    entries: RwLock<Arc<Vec<Entry>>>,
    interest: AtomicU8,
    next_id: AtomicU64,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            interest: AtomicU8::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn add(&self, mask: EventMask, sink: Sink) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.modify(|entries| entries.push(Entry { id, mask, sink }));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut removed = false;
        self.modify(|entries| {
            let before = entries.len();
            entries.retain(|e| e.id != id);
            removed = entries.len() != before;
        });
        removed
    }

    /// Union of the masks of every registered listener.
    #[inline]
    pub(crate) fn interest(&self) -> EventMask {
        EventMask::from_bits(self.interest.load(Ordering::Acquire))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Delivers `event` to every interested listener, in registration order.
    pub(crate) fn deliver(&self, event: &EngineEvent) {
        let category = event.category();
        let entries = self.snapshot();
        let mut closed: Vec<ListenerId> = Vec::new();
        for entry in entries.iter().filter(|e| e.mask.intersects(category)) {
            match &entry.sink {
                Sink::Callback(listener) => {
                    let result = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
                    if result.is_err() {
                        log::warn!("listener {} panicked while handling {:?}", entry.id, category);
                    }
                }
                Sink::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        closed.push(entry.id);
                    }
                }
            }
        }
        for id in closed {
            log::debug!("dropping closed subscriber {id}");
            self.remove(id);
        }
    }

    fn snapshot(&self) -> Arc<Vec<Entry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn modify(&self, f: impl FnOnce(&mut Vec<Entry>)) {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<Entry> = (**guard).clone();
        f(&mut next);
        let interest = next
            .iter()
            .fold(EventMask::NONE, |acc, e| acc | e.mask);
        *guard = Arc::new(next);
        self.interest.store(interest.bits(), Ordering::Release);
    }
}
