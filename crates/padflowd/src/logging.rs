// Colorized wrappers for logging

use colored::Colorize;
use fern::Dispatch;
use log::{Level, LevelFilter};

#[inline(always)]
pub(crate) fn format_log(message: &str) -> String {
    let now = chrono::Local::now().format("%Y.%m.%d %H:%M:%S%.3f").to_string();
    format!("[{now}] {message}")
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        let message = $crate::logging::format_log(&format!($($arg)*));
        log::error!("{}", message.bright_red());
    }
}

#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        let message = $crate::logging::format_log(&format!($($arg)*));
        log::info!("{message}");
    }
}

#[macro_export]
macro_rules! print_event {
    ($($arg:tt)*) => {
        let message = $crate::logging::format_log(&format!($($arg)*));
        log::info!("{}", message.bright_cyan());
    }
}

#[macro_export]
macro_rules! print_warning {
    ($($arg:tt)*) => {
        let message = $crate::logging::format_log(&format!($($arg)*));
        log::warn!("{}", message.bright_yellow());
    }
}

/// Log targets of the padflow crates: level when quiet, level when verbose.
const TARGETS: [(&str, LevelFilter, LevelFilter); 2] = [
    ("padflowd", LevelFilter::Info, LevelFilter::Debug),
    ("padflow_engine", LevelFilter::Warn, LevelFilter::Debug),
];

pub(crate) fn levels(verbose: bool) -> impl Iterator<Item = (&'static str, LevelFilter)> {
    TARGETS
        .into_iter()
        .map(move |(target, quiet, loud)| (target, if verbose { loud } else { quiet }))
}

/// Daemon records are already stamped by the `print_*` macros. Library
/// records get the stamp, their crate name and the matching color here.
pub(crate) fn decorate(target: &str, level: Level, message: &str) -> String {
    let origin = target.split("::").next().unwrap_or(target);
    if origin == "padflowd" {
        return message.to_owned();
    }
    let line = format_log(&format!("{origin}: {message}"));
    match level {
        Level::Error => line.bright_red().to_string(),
        Level::Warn => line.bright_yellow().to_string(),
        Level::Info => line,
        Level::Debug | Level::Trace => line.dimmed().to_string(),
    }
}

/// Setup the logger. Engine diagnostics are shown with `verbose`.
pub(crate) fn setup(verbose: bool, no_color: bool) {
    levels(verbose)
        .fold(Dispatch::new().level(LevelFilter::Warn), |dispatch, (target, level)| {
            dispatch.level_for(target, level)
        })
        .format(|out, message, record| {
            let line = decorate(record.target(), record.level(), &message.to_string());
            out.finish(format_args!("{line}"))
        })
        .chain(std::io::stdout())
        .apply()
        .expect("Unable to set up logger");

    if no_color {
        colored::control::set_override(false);
    }
}
