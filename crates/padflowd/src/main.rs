mod cli;
mod demo;
mod logging;

use std::io::ErrorKind;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use crossbeam_channel::{after, never, select, unbounded, Receiver};
use thiserror::Error;

use padflow_control::{ConfigError, ControlIndex, ControllerConfiguration, ControllerLayout};
use padflow_engine::sim::ScriptedDevice;
use padflow_engine::{
    Configurator, EngineError, EngineEvent, EventMask, IdentifyRequest, Runtime,
};
use padflow_store::{ConfigStore, StoreError};

use crate::cli::{Cli, Command};

const STOP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
enum Error {
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup(cli.verbose, cli.no_color);

    // Handle Ctrl+C to exit cleanly
    let (stop_tx, stop_rx) = unbounded::<()>();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    }) {
        print_error!("failed to set Ctrl+C handler: {e}");
        return ExitCode::FAILURE;
    }

    match run(&cli, &stop_rx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, stop: &Receiver<()>) -> Result<(), Error> {
    let layout = demo::layout();
    let store = ConfigStore::new(cli.store.as_deref())?;
    let config = load_configuration(&store, &layout)?;

    let runtime = Runtime::new()?;
    let (device, sim) = ScriptedDevice::new(layout.clone());
    let pad = runtime.attach_with(device, config)?;
    print_info!("attached {} ({})", layout.name(), layout.fingerprint());

    let period = Duration::from_millis(cli.period_ms.max(1));
    let (feeder_stop, feeder_stop_rx) = unbounded::<()>();
    let feeder = demo::spawn_feeder(sim, layout.len(), period, feeder_stop_rx);

    let result = match &cli.command {
        Command::Watch { seconds } => watch(&pad, period, *seconds, cli.verbose, stop),
        Command::Calibrate { seconds } => calibrate(&pad, period, *seconds, stop),
        Command::Identify { timeout_ms } => identify(&pad, period, *timeout_ms, stop),
    };

    drop(feeder_stop);
    if feeder.join().is_err() {
        print_error!("demo feeder panicked");
    }
    result
}

fn load_configuration(
    store: &ConfigStore,
    layout: &ControllerLayout,
) -> Result<ControllerConfiguration, Error> {
    match store.load(layout) {
        Ok(config) => {
            print_info!("loaded {}", store.path_for(layout.fingerprint()).display());
            Ok(config)
        }
        Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            let config = demo::configuration(layout)?;
            let path = store.save(&config, layout)?;
            print_info!("saved demo configuration to {}", path.display());
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

fn watch(
    pad: &Configurator,
    period: Duration,
    seconds: Option<u64>,
    verbose: bool,
    stop: &Receiver<()>,
) -> Result<(), Error> {
    let mut mask = EventMask::ACTIVATION | EventMask::LIFECYCLE;
    if verbose {
        mask |= EventMask::CHANGED;
    }
    let events = pad.subscribe(mask);
    pad.start_polling(period)?;
    print_info!("watching events, press Ctrl+C to stop");

    let deadline = seconds.map_or_else(never, |s| after(Duration::from_secs(s)));
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(deadline) -> _ => break,
            recv(events) -> msg => match msg {
                Ok(event) => print_engine_event(pad.layout(), &event),
                Err(_) => break,
            },
        }
    }

    if !pad.stop_polling_and_wait(STOP_TIMEOUT) {
        print_warning!("polling did not stop within {STOP_TIMEOUT:?}");
    }
    Ok(())
}

fn calibrate(
    pad: &Configurator,
    period: Duration,
    seconds: u64,
    stop: &Receiver<()>,
) -> Result<(), Error> {
    let events = pad.subscribe(EventMask::CALIBRATION | EventMask::LIFECYCLE);
    pad.start_calibrating()?;
    pad.start_polling(period)?;
    print_info!("calibrating for {seconds}s, move every control through its range");

    let deadline = after(Duration::from_secs(seconds));
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(deadline) -> _ => break,
            recv(events) -> msg => match msg {
                Ok(event) => print_engine_event(pad.layout(), &event),
                Err(_) => break,
            },
        }
    }

    pad.stop_polling_and_wait(STOP_TIMEOUT);
    let results = pad.stop_calibrating()?;
    for (control, range) in results.iter() {
        print_info!(
            "{:>10}: [{:+.3}, {:+.3}]{}",
            control_name(pad.layout(), control),
            range.low(),
            range.high(),
            if range.is_singularity() { " (never moved)" } else { "" }
        );
    }
    Ok(())
}

fn identify(
    pad: &Configurator,
    period: Duration,
    timeout_ms: Option<u64>,
    stop: &Receiver<()>,
) -> Result<(), Error> {
    let canceller = pad.clone();
    let stop = stop.clone();
    thread::spawn(move || {
        if stop.recv().is_ok() {
            canceller.cancel_identification();
        }
    });

    let mut request = IdentifyRequest::new().poll_period(period);
    if let Some(ms) = timeout_ms {
        request = request.timeout(Duration::from_millis(ms));
    }
    print_info!("press and release any control");

    match pad.identify_control(request) {
        Ok(Some(event)) => {
            print_event!(
                "identified {} {} (value {}, id {})",
                pad.layout()
                    .control(event.control)
                    .map_or("?", |c| c.kind().as_str()),
                control_name(pad.layout(), event.control),
                event.previous_value,
                format_id(event.previous_id)
            );
            Ok(())
        }
        Ok(None) => {
            print_warning!("no control identified before the timeout");
            Ok(())
        }
        Err(EngineError::Interrupted) => {
            print_warning!("identification interrupted");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_engine_event(layout: &ControllerLayout, event: &EngineEvent) {
    match event {
        EngineEvent::Activated(e) => {
            print_event!(
                "{} activated {} ({:+.3})",
                control_name(layout, e.control),
                format_id(e.current_id),
                e.current_value
            );
        }
        EngineEvent::Deactivated(e) => {
            print_event!(
                "{} deactivated {}",
                control_name(layout, e.control),
                format_id(e.previous_id)
            );
        }
        EngineEvent::Changed(e) => {
            print_change(layout, e.control, e.previous_value, e.current_value);
        }
        EngineEvent::CalibrationUpdated { control, range, .. } => {
            log::debug!(
                "{} range [{:+.3}, {:+.3}]",
                control_name(layout, *control),
                range.low(),
                range.high()
            );
        }
        EngineEvent::PollingHalted { controller } => {
            print_error!("controller {controller} failed, polling halted");
        }
        EngineEvent::Polled { .. }
        | EngineEvent::CalibrationStarted { .. }
        | EngineEvent::CalibrationStopped { .. } => {}
    }
}

fn print_change(layout: &ControllerLayout, control: ControlIndex, previous: f32, current: f32) {
    print_info!(
        "{} {:+.3} -> {:+.3}",
        control_name(layout, control),
        previous,
        current
    );
}

fn control_name(layout: &ControllerLayout, control: ControlIndex) -> String {
    let Some(name) = layout.control(control).map(|c| c.name()) else {
        return control.to_string();
    };
    layout
        .groups()
        .iter()
        .find(|g| g.range.contains(&control.get()))
        .map_or_else(|| name.to_owned(), |g| format!("{}.{name}", g.name))
}

fn format_id(id: Option<i32>) -> String {
    id.map_or_else(|| "-".to_owned(), |id| id.to_string())
}
