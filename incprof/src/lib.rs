//! Tools built on top of [`gprof_parse`] for sequences of gprof reports.
//!
//! # Modules
//!
//! - [`sequence`] - Turn cumulative reports into interval feature lines
//! - [`delta`] - Compare two reports to see which functions grew
//!
//! # Example
//!
//! ```no_run
//! use gprof_parse::Config;
//! use incprof::sequence::ReportSequence;
//! use std::path::Path;
//!
//! let mut seq = ReportSequence::new(Config::default());
//! for i in 0..4 {
//!     seq.push_path(Path::new(&format!("gprof-{i}.out"))).unwrap();
//! }
//! for line in seq.feature_lines().unwrap() {
//!     println!("{line}");
//! }
//! ```

pub mod delta;
pub mod sequence;

// Re-export gprof_parse for convenience
pub use gprof_parse;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr log subscriber used by the binaries. `RUST_LOG`
/// overrides the default level.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
