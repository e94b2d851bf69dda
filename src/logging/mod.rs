// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging setup.
//!
//! Everything in the crate logs through the `log` facade, usually via the
//! `*_fmt!` context macros. What ends up on screen depends on how logging
//! was initialised:
//!
//! * [`init`] installs `env_logger` (honouring `RUST_LOG`),
//! * [`init_with_config`] with `structured = true` installs a `slog`
//!   logger (terminal or JSON) as the global scope logger and bridges the
//!   `log` facade into it.
//!
//! Both are guarded so only the first call has an effect.

pub mod config;
pub mod structured;
pub mod test_logger;
mod wrapper;


pub use config::LoggingConfig;

use log::{info, LevelFilter};
use once_cell::sync::OnceCell;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

use structured::LoggerGuard;

static INIT: Once = Once::new();
static USING_STRUCTURED: AtomicBool = AtomicBool::new(false);
static STRUCTURED_GUARD: OnceCell<LoggerGuard> = OnceCell::new();

/// Initialise `env_logger` at `level` (default `info`); `RUST_LOG` wins.
pub fn init(level: Option<LevelFilter>) {
    INIT.call_once(|| init_env_logger(level.unwrap_or(LevelFilter::Info)));
}

/// Initialise logging from a [`LoggingConfig`].
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        if !config.structured {
            init_env_logger(config.level_filter());
            return;
        }

        let guard = structured::init_global_logger(&config.to_logger_config());
        let level = config.level_filter().to_level().unwrap_or(log::Level::Error);
        match slog_stdlog::init_with_level(level) {
            Ok(()) => {
                let _ = STRUCTURED_GUARD.set(guard);
                USING_STRUCTURED.store(true, Ordering::SeqCst);
                info!("Structured logging initialized ({}, {})", config.format, level);
            }
            Err(e) => eprintln!("failed to bridge log records to slog: {e}"),
        }
    });
}

/// Whether the structured logger is active.
pub fn is_structured() -> bool {
    USING_STRUCTURED.load(Ordering::SeqCst)
}

fn init_env_logger(level: LevelFilter) {
    let env = env_logger::Env::default().filter_or("RUST_LOG", level.to_string().to_lowercase());

    let result = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_target(true)
        .try_init();

    match result {
        Ok(()) => info!("Logging initialized at level: {}", log::max_level()),
        Err(e) => eprintln!("logger already installed: {e}"),
    }
}
