//! Scripted device used by tests, benchmarks and the demo harness.

use std::collections::VecDeque;

use crossbeam_channel::{unbounded, Receiver, Sender};
use padflow_control::{ControlIndex, ControllerLayout};

use crate::device::Device;

enum SimCommand {
    Frame(Vec<f32>),
    Hold(Vec<f32>),
    Set(ControlIndex, f32),
    Fail,
}

/// Replays frames of raw values, one value per control.
///
/// Each poll consumes one queued frame. When the queue is empty the last
/// frame is held, or the device fails if built with
/// [`ScriptedDevice::fail_when_exhausted`].
pub struct ScriptedDevice {
    layout: ControllerLayout,
    current: Vec<f32>,
    queue: VecDeque<Vec<f32>>,
    commands: Receiver<SimCommand>,
    fail_when_exhausted: bool,
    failed: bool,
}

/// Feeds a [`ScriptedDevice`] from another thread.
#[derive(Clone)]
pub struct SimHandle {
    tx: Sender<SimCommand>,
}

impl ScriptedDevice {
    pub fn new(layout: ControllerLayout) -> (Self, SimHandle) {
        let (tx, rx) = unbounded();
        let device = Self {
            current: vec![0.0; layout.len()],
            layout,
            queue: VecDeque::new(),
            commands: rx,
            fail_when_exhausted: false,
            failed: false,
        };
        (device, SimHandle { tx })
    }

    pub fn with_frames<I>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = Vec<f32>>,
    {
        self.queue.extend(frames);
        self
    }

    pub fn fail_when_exhausted(mut self) -> Self {
        self.fail_when_exhausted = true;
        self
    }

    /// Builds frames for a single control, every other control at rest.
    pub fn frames_for(layout: &ControllerLayout, control: ControlIndex, values: &[f32]) -> Vec<Vec<f32>> {
        values
            .iter()
            .map(|&v| {
                let mut frame = vec![0.0; layout.len()];
                if let Some(slot) = frame.get_mut(control.get()) {
                    *slot = v;
                }
                frame
            })
            .collect()
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                SimCommand::Frame(frame) => self.queue.push_back(frame),
                SimCommand::Hold(frame) => {
                    self.queue.clear();
                    self.queue.push_back(frame);
                }
                SimCommand::Set(control, value) => {
                    let mut frame = self
                        .queue
                        .back()
                        .cloned()
                        .unwrap_or_else(|| self.current.clone());
                    if let Some(slot) = frame.get_mut(control.get()) {
                        *slot = value;
                    }
                    self.queue.push_back(frame);
                }
                SimCommand::Fail => self.failed = true,
            }
        }
    }
}

impl Device for ScriptedDevice {
    fn layout(&self) -> &ControllerLayout {
        &self.layout
    }

    fn poll(&mut self) -> bool {
        self.drain_commands();
        if self.failed {
            return false;
        }
        match self.queue.pop_front() {
            Some(mut frame) => {
                frame.resize(self.layout.len(), 0.0);
                self.current = frame;
                true
            }
            None => !self.fail_when_exhausted,
        }
    }

    fn read_raw(&self, control: ControlIndex) -> f32 {
        self.current.get(control.get()).copied().unwrap_or(0.0)
    }
}

impl SimHandle {
    pub fn push_frame(&self, frame: Vec<f32>) {
        let _ = self.tx.send(SimCommand::Frame(frame));
    }

    /// Drops every queued frame and replaces them with `frame`. Live
    /// feeders use it so a slow poller never falls behind.
    pub fn hold(&self, frame: Vec<f32>) {
        let _ = self.tx.send(SimCommand::Hold(frame));
    }

    /// Queues a frame equal to the latest one with `control` set to `value`.
    pub fn set(&self, control: ControlIndex, value: f32) {
        let _ = self.tx.send(SimCommand::Set(control, value));
    }

    /// Makes every following poll fail.
    pub fn fail(&self) {
        let _ = self.tx.send(SimCommand::Fail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ControllerLayout {
        ControllerLayout::builder("sim").axis("x").button("a").build()
    }

    #[test]
    fn replays_frames_then_holds_last() {
        let (device, _handle) = ScriptedDevice::new(layout());
        let mut device = device.with_frames([vec![0.5, 1.0], vec![0.25]]);
        assert!(device.poll());
        assert_eq!(device.read_raw(ControlIndex(0)), 0.5);
        assert!(device.poll());
        assert_eq!(device.read_raw(ControlIndex(0)), 0.25);
        assert_eq!(device.read_raw(ControlIndex(1)), 0.0);
        assert!(device.poll());
        assert_eq!(device.read_raw(ControlIndex(0)), 0.25);
        assert_eq!(device.read_raw(ControlIndex(9)), 0.0);
    }

    #[test]
    fn fails_when_exhausted_if_asked() {
        let (device, _handle) = ScriptedDevice::new(layout());
        let mut device = device.with_frames([vec![0.0, 0.0]]).fail_when_exhausted();
        assert!(device.poll());
        assert!(!device.poll());
    }

    #[test]
    fn handle_sets_values_and_injects_failure() {
        let (mut device, handle) = ScriptedDevice::new(layout());
        handle.set(ControlIndex(1), 1.0);
        handle.set(ControlIndex(0), -0.5);
        assert!(device.poll());
        assert_eq!(device.read_raw(ControlIndex(1)), 1.0);
        assert_eq!(device.read_raw(ControlIndex(0)), 0.0);
        assert!(device.poll());
        assert_eq!(device.read_raw(ControlIndex(1)), 1.0);
        assert_eq!(device.read_raw(ControlIndex(0)), -0.5);

        handle.fail();
        assert!(!device.poll());
    }

    #[test]
    fn hold_replaces_queued_frames() {
        let (device, handle) = ScriptedDevice::new(layout());
        let mut device = device.with_frames([vec![0.1, 0.0], vec![0.2, 0.0]]);
        handle.hold(vec![0.9, 1.0]);
        assert!(device.poll());
        assert_eq!(device.read_raw(ControlIndex(0)), 0.9);
        assert!(device.poll());
        assert_eq!(device.read_raw(ControlIndex(1)), 1.0);
    }
}
