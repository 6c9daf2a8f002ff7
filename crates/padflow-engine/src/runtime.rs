use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use ahash::AHashMap;
use padflow_control::ControllerConfiguration;

use crate::configurator::{Configurator, Inner};
use crate::device::Device;
use crate::dispatch::Dispatcher;
use crate::events::ControllerId;
use crate::poller::ControllerPoller;
use crate::scheduler::{Command, Scheduler};
use crate::Result;

/// Owns the scheduler and dispatcher threads and every attached controller.
///
/// Dropping the runtime stops polling everywhere, delivers the events
/// already queued and joins both threads. Configurators that outlive it
/// report [`crate::EngineError::Disconnected`].
pub struct Runtime {
    scheduler: Scheduler,
    dispatcher: Dispatcher,
    controllers: RwLock<AHashMap<ControllerId, Configurator>>,
    next_id: AtomicU32,
}

impl Runtime {
    pub fn new() -> Result<Self> {
        let dispatcher = Dispatcher::start()?;
        let scheduler = Scheduler::start(dispatcher.handle())?;
        log::debug!("runtime started");
        Ok(Self {
            scheduler,
            dispatcher,
            controllers: RwLock::new(AHashMap::new()),
            next_id: AtomicU32::new(1),
        })
    }

    /// Attaches `device` with a default configuration.
    pub fn attach(&self, device: impl Device) -> Result<Configurator> {
        let config = ControllerConfiguration::new(device.layout());
        self.attach_with(device, config)
    }

    /// Attaches `device` with `config`, which must match its layout.
    pub fn attach_with(
        &self,
        device: impl Device,
        config: ControllerConfiguration,
    ) -> Result<Configurator> {
        let layout = Arc::new(device.layout().clone());
        config.ensure_matches(&layout)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new(Inner::new(
            id,
            layout.clone(),
            config,
            self.scheduler.handle(),
            self.dispatcher.handle(),
        ));
        let poller = ControllerPoller::with_shared(
            id,
            Box::new(device),
            layout.clone(),
            inner.slot.clone(),
            inner.listeners.clone(),
            inner.status.clone(),
        );
        self.scheduler
            .handle()
            .send(Command::Attach(Box::new(poller)))?;

        let configurator = Configurator { inner };
        self.controllers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, configurator.clone());
        log::info!("attached controller {id}: {}", layout.name());
        Ok(configurator)
    }

    pub fn configurator(&self, id: ControllerId) -> Option<Configurator> {
        self.controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Ids of every attached controller, ascending.
    pub fn controllers(&self) -> Vec<ControllerId> {
        let mut ids: Vec<ControllerId> = self
            .controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Stops polling `id` and releases its device. Existing configurators
    /// keep working on the configuration but never poll again.
    pub fn detach(&self, id: ControllerId) -> Result<bool> {
        let removed = self
            .controllers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        let Some(configurator) = removed else {
            return Ok(false);
        };
        configurator.inner.status.detach();
        self.scheduler.handle().send(Command::Detach(id))?;
        log::info!("detached controller {id}");
        Ok(true)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.scheduler.shutdown();
        self.dispatcher.shutdown();
        log::debug!("runtime stopped");
    }
}
