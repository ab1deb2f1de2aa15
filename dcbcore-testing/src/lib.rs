//! Test support shared by `dcbcore` backends and applications.
//!
//! - [`contract`]: the event-store contract suite, instantiated per backend
//!   with [`event_store_contract_tests!`]
//! - [`init_tracing`]: installs a test subscriber once per process

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    unused_imports,
    unused_must_use,
    unused_mut,
    unused_variables
)]

pub mod contract;

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber writing through the test harness.
///
/// The filter comes from `RUST_LOG` and defaults to `debug` for the `dcbcore`
/// crates. Calling this more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,dcbcore=debug,dcbcore_memory=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
