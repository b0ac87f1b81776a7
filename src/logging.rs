//! Structured logging setup.
//!
//! One `tracing` subscriber for the whole process. Level filtering comes
//! from `RUST_LOG` (default `info`); `MIRROR_LOG_JSON=1` switches to a
//! machine-readable JSON writer for deployments that ship logs elsewhere.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("MIRROR_LOG_JSON").as_deref() == Ok("1");

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}
