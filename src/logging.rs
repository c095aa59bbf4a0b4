/// Initialize the global tracing subscriber
///
/// `RUST_LOG` controls the level and defaults to `info`:
///
/// ```bash
/// RUST_LOG=debug gps-replay track.nmea   # every broadcast step
/// RUST_LOG=warn gps-replay track.nmea    # failures only
/// ```
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();
}
