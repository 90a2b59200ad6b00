use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use jami_web_server::auth::{self, AccountStore};
use jami_web_server::config::{generate_config_template, Config};
use jami_web_server::daemon::{self, DaemonHandle};
use jami_web_server::routes;
use jami_web_server::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Handle --hash-password: print an accounts.json hash and exit
    if let Some(password) = &config.hash_password {
        println!("{}", auth::login::hash_password(password)?);
        return Ok(());
    }

    // Initialize tracing/logging
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jami_web_server=info"))
    };
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(env_filter())
            .init();
    }

    tracing::info!("jami-web server v{} starting", env!("CARGO_PKG_VERSION"));

    let signing_keys = auth::jwt::load_or_generate_signing_keys(&config.data_dir)?;
    let accounts = AccountStore::load(&config.data_dir)?;

    // Channels between axum and the daemon driver
    let (daemon_handle, cmd_rx) = DaemonHandle::channel();
    let (evt_tx, evt_rx) = tokio::sync::mpsc::unbounded_channel::<daemon::DaemonEvent>();

    match config.daemon_addr.clone() {
        Some(addr) => {
            tokio::spawn(async move {
                if let Err(e) = daemon::ipc::run_ipc_loop(&addr, cmd_rx, evt_tx).await {
                    tracing::error!(error = %e, "Daemon link terminated");
                }
            });
        }
        None => {
            tokio::spawn(daemon::loopback::run_loopback(cmd_rx, evt_tx));
        }
    }

    let app_state = AppState::new(
        signing_keys,
        accounts,
        config.token_ttl_secs,
        &daemon_handle,
    );

    // Route daemon events to WebSocket clients
    tokio::spawn(daemon::events::run_event_consumer(
        evt_rx,
        app_state.registry.clone(),
    ));

    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
