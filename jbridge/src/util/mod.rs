//! Process-level helpers.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::runtime::constants::{envs, logging};

/// Install a stderr subscriber filtered by `JBRIDGE_LOG` (default `warn`).
///
/// Safe to call more than once and from processes that already installed a
/// subscriber; later calls are ignored.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_env(envs::JBRIDGE_LOG)
        .or_else(|_| EnvFilter::try_new(logging::DEFAULT_FILTER))
        .unwrap_or_else(|_| EnvFilter::new(logging::DEFAULT_FILTER));

    register_to_tracing(std::io::stderr, env_filter);
}

/// Register a formatting layer writing to `writer`.
pub fn register_to_tracing<W>(writer: W, env_filter: EnvFilter)
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(writer).with_target(true))
        .try_init();

    if installed.is_ok() {
        tracing::debug!("Logging initialized");
    }
}
