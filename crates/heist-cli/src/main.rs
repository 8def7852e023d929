// Heist console client entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open the session store
// 4. Build the command API and the push connection
// 5. Initialize the sync engine
// 6. Create mpsc channels
// 7. Spawn the event loop task
// 8. Run the console (blocking until the player quits)
// 9. Cleanup on exit

mod console;
mod input;
mod render;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

use heist_client::api::HttpCommandApi;
use heist_client::app;
use heist_client::config;
use heist_client::connection::{ConnectionManager, WsConnector};
use heist_client::store::{session_scope, SessionStore};
use heist_client::SyncEngine;

/// Env var checked before `RUST_LOG` for the log filter.
const LOG_ENV: &str = "HEIST_LOG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("Heist client starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!("Config loaded: server={}", config.api_base_url());

    // 3. Open the session store
    let store_path = config.store_path();
    let scope = session_scope();
    let store = SessionStore::open_file(&store_path, &scope)
        .context("failed to open session store")?;
    info!("Session store opened at {} (scope {scope})", store_path.display());

    // 4. Build the command API and the push connection
    let api = Arc::new(HttpCommandApi::new(config.api_base_url()));
    let connection = ConnectionManager::new(Arc::new(WsConnector), config.ws_base_url());

    // 5. Initialize the sync engine
    let (engine, events) = SyncEngine::new(api, store, connection, config.error_display());

    // 6. Create mpsc channels
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    // 7. Spawn the event loop task
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(engine, events, cmd_rx, ui_tx).await {
            error!("Event loop error: {e:#}");
        }
    });

    // 8. Run the console (blocking until the player quits)
    println!("heist client, type `help` for commands");
    if let Err(e) = console::run(ui_rx, cmd_tx).await {
        error!("Console error: {e:#}");
    }

    // 9. Cleanup: wait for the event loop to finish (with timeout)
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    info!("Heist client shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (the terminal belongs to the console).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("heist.log"))?;

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("heist_client=info,warn"));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
