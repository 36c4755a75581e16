pub mod api;
pub mod config;
pub mod deserializers;
pub mod envelope;
pub mod error;
pub mod geocoding;
pub mod ids;
pub mod models;
pub mod normalizer;
pub mod views;

pub use error::{Result, RideAlongError};

/// Install the global `tracing` subscriber. Logs go to stderr so stdout stays
/// free for command output.
pub fn init_tracing(runtime: &config::RuntimeConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(runtime.log_level.as_str())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
