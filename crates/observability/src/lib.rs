//! Process-wide logging setup shared by the banking binaries.

pub mod logging;

pub use logging::{LogFormat, ParseLogFormatError};

/// Initialize structured logging with the format named by `COREBANK_LOG_FORMAT`
/// (JSON when unset or unrecognized).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    let format = std::env::var(logging::ENV_LOG_FORMAT)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default();
    logging::init(format);
}
