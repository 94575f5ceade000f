//! Logging prelude module for convenient access to tracing macros.
//!
//! ```ignore
//! use crate::logging::*;
//!
//! debug!("-> {}", line);
//! warn!("Skipping symlinked directory {}", dir.display());
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// Logs at INFO level and above unless `RUST_LOG` says otherwise, or
/// `default_filter` is given:
///
/// ```bash
/// RUST_LOG=cvsr=debug cvsr update
/// RUST_LOG=cvsr::session=trace,cvsr::planner=debug cvsr status
/// ```
pub fn init_tracing(default_filter: Option<&str>) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter.unwrap_or("info")));
	// A host that installed its own subscriber keeps it
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// vim: ts=4
