//! OS-level helpers: child process bookkeeping and the milestone log macro.

pub mod registry;

pub use registry::{global_registry, ProcessRegistry, RegisteredProcess};

/// High-level milestone, also written to the parsed log.
#[macro_export]
macro_rules! log_parsed {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        log::info!(target: "parsed", "{}", msg);
    }}
}
