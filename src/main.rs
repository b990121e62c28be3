use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use apiproxy::{
    adapters::{FileConfigProvider, HttpHandler, router},
    config::{
        GatewayConfigValidator,
        loader::{load_config, load_config_unchecked},
        models::GatewayConfig,
    },
    core::{GatewayService, GatewaySnapshot, service_control::CallKind},
    ports::config_provider::ConfigProvider,
    tracing_setup,
    utils::GracefulShutdown,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use http::Method;
use tracing::Instrument;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "apiproxy.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate a configuration file and report rejected HTTP rules
    Validate {
        #[clap(short, long, default_value = "apiproxy.toml")]
        config: String,
    },
    /// Write a starter configuration file
    Init {
        #[clap(short, long, default_value = "apiproxy.toml")]
        config: String,
    },
    /// Print the routing decision for one request
    Resolve {
        #[clap(short, long, default_value = "apiproxy.toml")]
        config: String,
        /// HTTP method
        #[clap(short, long, default_value = "GET")]
        method: String,
        /// Request path, percent-encoded as received
        #[clap(short, long)]
        path: String,
    },
    /// Serve the decision endpoint (default)
    Serve {
        #[clap(short, long, default_value = "apiproxy.toml")]
        config: String,
    },
}

const RELOAD_DEBOUNCE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Resolve {
            config,
            method,
            path,
        }) => resolve_command(&config, &method, &path).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    tracing_setup::init_tracing().map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    tracing::info!(path = config_path, "loading initial configuration");

    let config_provider: Arc<dyn ConfigProvider> = Arc::new(
        FileConfigProvider::new(config_path).context("Failed to create config provider")?,
    );
    let initial_config: GatewayConfig = config_provider
        .load_config()
        .await
        .with_context(|| format!("Failed to load initial config from {config_path}"))?;

    let addr: SocketAddr = format!(
        "{}:{}",
        initial_config.listener.address, initial_config.listener.port
    )
    .parse()
    .context("Failed to parse listener address")?;

    let gateway_service = Arc::new(
        GatewayService::new(Arc::new(initial_config)).context("Failed to build gateway state")?,
    );
    log_snapshot(&gateway_service.snapshot());

    spawn_config_watcher(
        config_provider.clone(),
        gateway_service.clone(),
        config_path.to_string(),
    )?;

    let graceful_shutdown = GracefulShutdown::new();
    let signal_handler = graceful_shutdown.clone();
    tokio::spawn(async move { signal_handler.run_signal_handler().await });

    let app = router(Arc::new(HttpHandler::new(gateway_service.clone())));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!(%addr, "apiproxy decision endpoint listening");

    let shutdown = graceful_shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown.wait_for_shutdown_signal().await;
            tracing::info!(?reason, "shutting down decision endpoint");
        })
        .await
        .context("Server error")?;

    tracing::info!("graceful shutdown completed");
    Ok(())
}

fn spawn_config_watcher(
    provider: Arc<dyn ConfigProvider>,
    gateway_service: Arc<GatewayService>,
    config_path: String,
) -> Result<()> {
    let mut notify_rx = provider.watch()?;

    tokio::spawn(async move {
        let mut last_reload = tokio::time::Instant::now()
            .checked_sub(RELOAD_DEBOUNCE)
            .unwrap_or_else(tokio::time::Instant::now);

        while notify_rx.recv().await.is_some() {
            // let an editor's write burst settle before reading the file
            let since_last = last_reload.elapsed();
            if since_last < RELOAD_DEBOUNCE {
                tokio::time::sleep(RELOAD_DEBOUNCE - since_last).await;
            }
            while notify_rx.try_recv().is_ok() {}
            last_reload = tokio::time::Instant::now();

            reload_once(provider.as_ref(), &gateway_service)
                .instrument(tracing_setup::create_reload_span(&config_path))
                .await;
        }
        tracing::info!("config watcher task is shutting down");
    });

    Ok(())
}

async fn reload_once(provider: &dyn ConfigProvider, gateway_service: &GatewayService) {
    let new_config = match provider.load_config().await {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(
                error = %e,
                "failed to reload configuration; keeping current generation"
            );
            return;
        }
    };

    match gateway_service.reload(Arc::new(new_config)) {
        Ok(generation) => {
            tracing::Span::current().record("generation", generation);
            log_snapshot(&gateway_service.snapshot());
        }
        Err(e) => {
            tracing::error!(error = %e, "rejected new configuration; keeping current generation")
        }
    }
}

fn log_snapshot(snapshot: &GatewaySnapshot) {
    for route in snapshot.routes().routes() {
        tracing::info!(
            selector = %route.selector,
            method = %route.method,
            template = route.matcher.template(),
            "route"
        );
    }
    for rejected in snapshot.rejected_rules() {
        tracing::warn!(rule = %rejected, "rule rejected");
    }
    for rejected in snapshot.backends().rejected() {
        tracing::warn!(error = %rejected, "backend rule rejected");
    }
    let service_control = snapshot.service_control();
    for kind in CallKind::ALL {
        let policy = service_control.policy(kind);
        tracing::info!(
            call = %kind,
            timeout_ms = policy.timeout.as_millis() as u64,
            retries = policy.retries,
            fail_open = service_control.network_fail_open,
            "service control policy"
        );
    }
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    tracing_setup::init_console_tracing()?;

    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config_unchecked(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = GatewayConfigValidator::validate(&config) {
        eprintln!("❌ Configuration validation failed:");
        eprintln!("{e}");
        std::process::exit(1);
    }
    println!("✅ Configuration validation: OK");

    let snapshot = GatewaySnapshot::build(Arc::new(config), 0)?;
    let rejected = snapshot.rejected_rules();
    let backend_rejected = snapshot.backends().rejected();

    println!();
    println!("📋 Configuration Summary:");
    println!("   • Service: {}", snapshot.config().service_name);
    println!(
        "   • Listener: {}:{}",
        snapshot.config().listener.address,
        snapshot.config().listener.port
    );
    println!("   • Routes: {}", snapshot.routes().len());
    println!("   • Authenticated methods: {}", snapshot.auth().len());
    println!("   • CORS: {}", snapshot.cors().is_some());
    let service_control = snapshot.service_control();
    println!(
        "   • Service control (fail open: {}):",
        service_control.network_fail_open
    );
    for kind in CallKind::ALL {
        let policy = service_control.policy(kind);
        println!(
            "     - {kind}: timeout {}, {} retries",
            humantime::format_duration(policy.timeout),
            policy.retries
        );
    }

    if !rejected.is_empty() || !backend_rejected.is_empty() {
        println!();
        println!("⚠️  Rules that will not be loaded:");
        for rule in rejected {
            println!("   • {rule}");
        }
        for rule in backend_rejected {
            println!("   • {rule}");
        }
    }
    Ok(())
}

/// Print the decision for one request and exit non-zero when nothing matches.
async fn resolve_command(config_path: &str, method: &str, path: &str) -> Result<()> {
    tracing_setup::init_console_tracing()?;

    let config = load_config(config_path).await?;
    let gateway = GatewayService::new(Arc::new(config))?;

    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| eyre!("Invalid HTTP method: {method}"))?;
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let decoded = urlencoding::decode(path).context("Request path is not valid UTF-8")?;

    match gateway.decide(&method, &decoded) {
        Some(decision) => {
            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(())
        }
        None => {
            eprintln!("❌ No route matches {method} {decoded}");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# apiproxy configuration

service_name = "bookstore.endpoints.example.cloud.goog"
backend_protocol = "http1"

[listener]
address = "0.0.0.0"
port = 8080

[cluster]
address = "127.0.0.1"
port = 8082

[[service.http_rules]]
selector = "endpoints.examples.bookstore.Bookstore.ListShelves"
method = "GET"
pattern = "/v1/shelves"

[[service.http_rules]]
selector = "endpoints.examples.bookstore.Bookstore.GetBook"
method = "GET"
pattern = "/v1/shelves/{shelf}/books/{book}"

# [[service.authentication.providers]]
# id = "google_id_token"
# issuer = "https://accounts.google.com"
# jwks_uri = "https://www.googleapis.com/oauth2/v3/certs"
#
# [[service.authentication.rules]]
# selector = "endpoints.examples.bookstore.Bookstore.GetBook"
# requirements = [{ provider_id = "google_id_token" }]

# enable_backend_routing = true
# [[service.backend.rules]]
# selector = "endpoints.examples.bookstore.Bookstore.GetBook"
# address = "https://books.example.com/api"
# path_translation = "APPEND_PATH_TO_ADDRESS"
# deadline = "10s"
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'apiproxy serve --config {config_path}' to start the decision endpoint");
    Ok(())
}
