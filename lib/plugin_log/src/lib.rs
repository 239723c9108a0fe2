//!
//! @file lib.rs
//! @brief Diagnostic sink for the loaded module.
//! @bug No known bugs.
//!
//! The host has no console of its own, so diagnostics go to a log file the
//! module opens at load time. Warnings and fatal messages are mirrored to
//! standard error, which the console window collaborator captures when one
//! is attached. Nothing in here panics: most call sites are themselves
//! failure paths.
//!

use std::fmt::Arguments;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

/// The global file we log our output to.
static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();

/// How a message is presented. Used through the macros, not directly.
#[doc(hidden)]
#[derive(Copy, Clone)]
pub enum Level {
    Message,
    Warning,
    Fatal
}

///
/// Opens the log file at the given path, truncating any previous log.
///
/// May only be called once per session; later calls fail without touching
/// the already-open file.
///
pub fn open(
    path: &Path
) -> std::io::Result<()> {
    let f = File::create(path)?;
    LOG_FILE.set(Mutex::new(f)).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::AlreadyExists, "log file is already open")
    })
}

/// Checks if a log file has been opened.
pub fn is_open() -> bool {
    LOG_FILE.get().is_some()
}

#[doc(hidden)]
pub fn write(
    level: Level,
    args: Arguments<'_>
) {
    let prefix = match level {
        Level::Message => "",
        Level::Warning => "[WARNING] ",
        Level::Fatal => "[FATAL] "
    };

    if let Some(f) = LOG_FILE.get() {
        if let Ok(mut f) = f.lock() {
            let _ = writeln!(f, "{}{}", prefix, args);
        }
    }

    if !matches!(level, Level::Message) || LOG_FILE.get().is_none() {
        eprintln!("{}{}", prefix, args);
    }
}

/// Logs an informational message.
#[macro_export]
macro_rules! plugin_message {
    ($($fmt:tt)*) => {
        $crate::write($crate::Level::Message, ::core::format_args!($($fmt)*))
    };
}

/// Logs a recoverable problem.
#[macro_export]
macro_rules! plugin_warning {
    ($($fmt:tt)*) => {
        $crate::write($crate::Level::Warning, ::core::format_args!($($fmt)*))
    };
}

/// Logs a problem the session cannot continue past.
#[macro_export]
macro_rules! plugin_fatal {
    ($($fmt:tt)*) => {
        $crate::write($crate::Level::Fatal, ::core::format_args!($($fmt)*))
    };
}
