#![deny(missing_docs)]
//! Shared logging utilities for the quill workspace.
//!
//! This crate provides the `quill_*` logging macros used by the core, the
//! engine and the binary, plus a minimal test initializer for the global
//! logger. The macros forward to the `log` facade so that whichever logger
//! the binary installs receives every record.

/// Log target used for records about the streaming wire protocol.
pub const PROTOCOL_TARGET: &str = "quill::protocol";

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! quill_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! quill_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! quill_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! quill_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! quill_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Logs a debug-level record under [`PROTOCOL_TARGET`].
///
/// Used for framing drift: payloads that are tolerated rather than rejected.
#[macro_export]
macro_rules! quill_protocol {
    ($($arg:tt)*) => {{
        log::debug!(target: $crate::PROTOCOL_TARGET, $($arg)*);
    }};
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
