use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Initialise `env_logger` for the CLI. Dependencies log at `warn`; this crate at `info`, or
/// `debug` when `verbose`. Lines from named worker threads carry the thread name.
/// Safe to call more than once; only the first call installs the logger.
pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME").cyan();
            let thread = std::thread::current();
            let origin = match thread.name() {
                Some(t) if t != "main" => format!(" {}", t.dimmed()),
                _ => String::new(),
            };
            let line = match record.level() {
                Level::Error => format!("[{}{} {}] {}", name, origin, "ERROR".red(), record.args()),
                Level::Warn => format!("[{}{} {}] {}", name, origin, "WARN".yellow(), record.args()),
                _ => format!("[{}{}] {}", name, origin, record.args()),
            };
            writeln!(buf, "{}", line)
        })
        .try_init();
}
