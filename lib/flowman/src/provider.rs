// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Providers allow the engine to work in different contexts by
//! plugging in implementations of core services. Logging is the one
//! service the flow manager needs: a CLI wants structured logs, a unit
//! test wants `println!`, and an embedded datapath agent may want
//! nothing at all.

use core::fmt;
use core::fmt::Display;

/// A logging provider provides the means to log messages to some
/// destination based on the context in which the engine is running.
///
/// Logging levels are provided by [`LogLevel`]. These levels will map
/// to the underlying provider with varying degrees of success.
pub trait LogProvider: Send + Sync {
    /// Log a message at the specified level.
    fn log(&self, level: LogLevel, msg: &str);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Note,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_s = match self {
            Self::Note => "[NOTE]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        };
        write!(f, "{level_s}")
    }
}

/// Discard all messages.
#[derive(Clone, Copy, Debug)]
pub struct NoLog;

impl LogProvider for NoLog {
    fn log(&self, _level: LogLevel, _msg: &str) {}
}

#[cfg(any(feature = "std", test))]
#[derive(Clone, Copy, Debug)]
pub struct PrintlnLog;

#[cfg(any(feature = "std", test))]
impl LogProvider for PrintlnLog {
    fn log(&self, level: LogLevel, msg: &str) {
        println!("{level} {msg}");
    }
}

/// Forward messages to a [`slog::Logger`].
#[cfg(feature = "slog")]
pub struct SlogLog {
    log: slog::Logger,
}

#[cfg(feature = "slog")]
impl SlogLog {
    pub fn new(log: slog::Logger) -> Self {
        Self { log }
    }
}

#[cfg(feature = "slog")]
impl LogProvider for SlogLog {
    fn log(&self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Note => slog::info!(self.log, "{}", msg),
            LogLevel::Warn => slog::warn!(self.log, "{}", msg),
            LogLevel::Error => slog::error!(self.log, "{}", msg),
        }
    }
}
