//! Process logger initialisation.
use std::io::stdout;
use std::sync::Mutex;

use slog::Drain;
use slog::LevelFilter;
use slog::Logger;
use slog::Never;
use slog::SendSyncRefUnwindSafeDrain;
use slog::SendSyncUnwindSafeDrain;
use slog_async::Async;
use slog_json::Json;

use portal_conf::LoggingConf;
use portal_conf::LoggingDrain;
use portal_conf::LoggingLevel;

/// Converts a [`Drain`] into a [`Logger`] setting global tags.
fn into_logger<D>(drain: D) -> Logger
where
    D: SendSyncUnwindSafeDrain<Ok = (), Err = Never>,
    D: 'static + SendSyncRefUnwindSafeDrain<Err = Never, Ok = ()>,
{
    Logger::root(
        drain,
        slog::o!(
            "version" => crate::VERSION,
            "git_hash" => crate::GIT_BUILD_HASH,
        ),
    )
}

/// Map the configured level onto [`slog::Level`].
fn level(level: LoggingLevel) -> slog::Level {
    match level {
        LoggingLevel::Critical => slog::Level::Critical,
        LoggingLevel::Error => slog::Level::Error,
        LoggingLevel::Warning => slog::Level::Warning,
        LoggingLevel::Info => slog::Level::Info,
        LoggingLevel::Debug => slog::Level::Debug,
        LoggingLevel::Trace => slog::Level::Trace,
    }
}

/// Creates a [`Logger`] based on the given configuration.
pub fn configure(conf: &LoggingConf) -> Logger {
    match conf.drain {
        LoggingDrain::Json => {
            let drain = Mutex::new(Json::default(stdout())).ignore_res();
            let drain = LevelFilter::new(drain, level(conf.level)).ignore_res();
            match conf.async_flush {
                true => into_logger(Async::new(drain).build().ignore_res()),
                false => into_logger(drain),
            }
        }
    }
}

/// Creates a fixed [`Logger`] to be used until configuration is loaded.
pub fn starter() -> Logger {
    let drain = Mutex::new(Json::default(stdout())).ignore_res();
    into_logger(drain)
}
