use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, tick, Receiver};
use padflow_control::{ControlIndex, ControllerConfiguration, ControllerLayout};
use padflow_engine::sim::SimHandle;

pub(crate) const STICK_X: ControlIndex = ControlIndex(0);
pub(crate) const STICK_Y: ControlIndex = ControlIndex(1);
pub(crate) const DPAD: ControlIndex = ControlIndex(2);
pub(crate) const BUTTON_A: ControlIndex = ControlIndex(3);
pub(crate) const BUTTON_B: ControlIndex = ControlIndex(4);
pub(crate) const WHEEL: ControlIndex = ControlIndex(5);

pub(crate) fn layout() -> ControllerLayout {
    ControllerLayout::builder("Demo Pad")
        .group("stick", |g| g.axis("x").axis("y"))
        .hat("dpad")
        .group("buttons", |g| g.button("a").button("b"))
        .relative_axis("wheel")
        .feedback("rumble")
        .build()
}

/// Tuning used when nothing was saved for the demo layout.
pub(crate) fn configuration(layout: &ControllerLayout) -> padflow_control::Result<ControllerConfiguration> {
    let mut config = ControllerConfiguration::new(layout);
    for axis in [STICK_X, STICK_Y] {
        let axis = config.control_mut(axis)?;
        axis.set_dead_zone(-0.08, 0.08)?;
        axis.set_granularity(0.05)?;
        axis.bind_value(1.0, 1)?;
        axis.bind_value(-1.0, -1)?;
    }
    config.control_mut(STICK_Y)?.set_inverted(true);

    let dpad = config.control_mut(DPAD)?;
    dpad.bind_value(0.25, 20)?;
    dpad.bind_value(0.75, 21)?;

    let a = config.control_mut(BUTTON_A)?;
    a.bind_value(1.0, 10)?;
    a.set_turbo_enabled(true);
    a.set_turbo_delay(Duration::from_millis(150));
    config.control_mut(BUTTON_B)?.bind_value(1.0, 11)?;
    config.control_mut(WHEEL)?.bind_value(1.0, 30)?;
    Ok(config)
}

/// Raw values of the demo device `step` ticks after start.
pub(crate) fn frame_at(step: u64) -> [(ControlIndex, f32); 6] {
    let t = step as f32 / 100.0;
    let pressed = |period: u64, held: u64| if step % period < held { 1.0 } else { 0.0 };
    let dpad = match (step / 150) % 4 {
        1 => 0.25,
        3 => 0.75,
        _ => 0.0,
    };
    [
        (STICK_X, (t * 1.3).sin()),
        (STICK_Y, (t * 0.7).cos() * 0.9),
        (DPAD, dpad),
        (BUTTON_A, pressed(120, 30)),
        (BUTTON_B, pressed(310, 8)),
        (WHEEL, if step % 97 == 0 { 1.0 } else { 0.0 }),
    ]
}

/// Feeds the simulated device until `stop` fires or disconnects.
pub(crate) fn spawn_feeder(
    sim: SimHandle,
    width: usize,
    period: Duration,
    stop: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let ticker = tick(period);
        let mut step = 0u64;
        loop {
            select! {
                recv(stop) -> _ => break,
                recv(ticker) -> _ => {
                    let mut frame = vec![0.0; width];
                    for (control, value) in frame_at(step) {
                        if let Some(slot) = frame.get_mut(control.get()) {
                            *slot = value;
                        }
                    }
                    sim.hold(frame);
                    step += 1;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_stay_in_range() {
        let layout = layout();
        for step in 0..2_000 {
            for (control, value) in frame_at(step) {
                assert!(layout.control(control).is_some());
                assert!((-1.0..=1.0).contains(&value), "{control} = {value}");
            }
        }
    }

    #[test]
    fn demo_configuration_is_valid() {
        let layout = layout();
        let config = configuration(&layout).unwrap();
        assert!(config.ensure_matches(&layout).is_ok());
        assert_eq!(config.control(BUTTON_A).unwrap().value_id(1.0), Some(10));
    }

    #[test]
    fn buttons_are_pressed_and_released() {
        let a: Vec<f32> = (0..240).map(|s| frame_at(s)[3].1).collect();
        assert!(a.contains(&1.0));
        assert!(a.contains(&0.0));
    }
}
