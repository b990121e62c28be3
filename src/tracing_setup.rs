use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Structured JSON logging for the running sidecar.
pub fn init_tracing() -> Result<()> {
    Registry::default()
        .with(env_filter_or("info"))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .wrap_err("Failed to install JSON subscriber")?;

    tracing::info!("apiproxy structured logging initialized");
    Ok(())
}

/// Human-readable logging for the CLI subcommands.
pub fn init_console_tracing() -> Result<()> {
    Registry::default()
        .with(env_filter_or("warn"))
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .wrap_err("Failed to install console subscriber")?;
    Ok(())
}

/// Request-scoped span for the decision endpoint. Status and the matched
/// selector are recorded once known.
pub fn create_request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        request.id = request_id,
        http.status_code = tracing::field::Empty,
        route.selector = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Span covering one configuration reload.
pub fn create_reload_span(source: &str) -> tracing::Span {
    tracing::info_span!(
        "config_reload",
        config.source = source,
        generation = tracing::field::Empty,
    )
}
