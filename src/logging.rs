use log::{debug, log_enabled, Level, LevelFilter};

/// Initializes the logger with the `env_logger` crate.
///
/// `RUST_LOG` selects verbosity; without it only warnings and errors are
/// shown. Calling it more than once keeps the first logger.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();
}

/// Initializes the logger with a fixed maximum level, ignoring `RUST_LOG`.
pub fn init_logger_with_level(level: LevelFilter) {
    let _ = env_logger::Builder::new().filter_level(level).try_init();
}

/// Logs a frame as hex at debug level.
pub fn log_frame(label: &str, frame: &[u8]) {
    if log_enabled!(Level::Debug) {
        debug!("{label} ({} bytes): {}", frame.len(), hex::encode_upper(frame));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logger();
        init_logger();
        init_logger_with_level(LevelFilter::Debug);
        log_frame("frame", &[0x01, 0x02]);
    }
}
