use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "captiongenie=info";

fn init_env_layer() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Load `.env` if present and install the stderr subscriber.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let dotenv = dotenvy::dotenv();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = tracing_subscriber::registry()
        .with(init_env_layer())
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        match dotenv {
            Ok(path) => tracing::debug!(path = %path.display(), ".env loaded"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "could not load .env file"),
        }
    }
}
