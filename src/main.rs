//! # Tidewatch — AI-signalled position reconciler for one perpetual swap
//!
//! ```text
//!                  ┌──────────────────────── Supervisor task ─────────────────────────┐
//!  OKX REST ◀────▶ │ snapshot → oracle → brain → reconcile → oracle → ledger → publish │
//!  DeepSeek ◀────▶ └───────────────────────────────┬───────────────────────────────────┘
//!                                                  │ writes
//!                                                  ▼
//!                                      AppState (RwLock + broadcast_tx)
//!                                                  │ reads
//!  ┌─────────────┐  ws://host/ws/monitor  ◀────────┤
//!  │  Dashboard  │  GET  /api/status | /api/signals | /api/equity_curve | /api/stats
//!  └─────────────┘  POST /api/bot/pause | /api/bot/resume
//! ```
//!
//! ## Environment Variables
//!
//! | Variable              | Default               | Description                          |
//! |-----------------------|-----------------------|--------------------------------------|
//! | `OKX_API_KEY`         | — (required)          | exchange key                         |
//! | `OKX_SECRET`          | — (required)          | exchange secret                      |
//! | `OKX_PASSWORD`        | — (required)          | exchange passphrase                  |
//! | `AI_API_KEY`          | — (required)          | or `DEEPSEEK_API_KEY`                |
//! | `AI_PROVIDER`         | `deepseek`            | `deepseek` \| `openai` \| `claude`   |
//! | `AI_MODEL`            | provider default      | model override                       |
//! | `INSTRUMENT`          | `BTC-USDT-SWAP`       | the one instrument traded            |
//! | `DATA_DIR`            | `.`                   | JSON documents                       |
//! | `BIND_ADDR`           | `0.0.0.0:3000`        | HTTP listen address                  |
//! | `API_KEY`             | empty (open)          | required `X-API-Key` when set        |
//! | `RUST_LOG`            | `tidewatch=debug`     | tracing filter                       |

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod brain;
mod config;
mod engine;
mod error;
mod events;
mod exchange;
mod models;
mod routes;
mod state;
mod store;

use brain::ChatClient;
use config::{mask, Config, ConfigStore};
use engine::ledger::Ledger;
use engine::supervisor::{Supervisor, LATEST_SIGNAL_FILE};
use exchange::okx::OkxClient;
use models::TradeSignal;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("tidewatch=debug".parse()?)
                .add_directive("tower_http=info".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║              TIDEWATCH — Position Reconciler          ║
  ║   Snapshot · Signal · Reconcile · Ledger · Publish    ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config (missing credentials = refuse to start) ─────────────────────
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {e:#}");
            return Err(e);
        }
    };

    info!(
        instrument = %config.instrument,
        okx_key    = %mask(&config.okx.api_key),
        simulated  = config.okx_simulated,
        provider   = %config.ai_provider,
        model      = %config.ai_model,
        data_dir   = %config.data_dir.display(),
        "⚙️ configuration loaded"
    );

    // ── 4. Collaborators ──────────────────────────────────────────────────────
    let http = reqwest::Client::new();
    let exchange = Arc::new(
        OkxClient::new(http.clone(), config.okx.clone())
            .with_base_url(config.okx_base_url.clone())
            .with_simulated(config.okx_simulated),
    );
    let inference = Arc::new(ChatClient::new(http, &config));

    // ── 5. Shared state (ledger + last signal survive restarts) ───────────────
    let ledger = Ledger::load(&config.data_dir).await;
    let bot_config = ConfigStore::new(&config.data_dir).load().await;
    let latest_signal = match store::load_json::<TradeSignal>(&config.data_dir.join(LATEST_SIGNAL_FILE)).await {
        Ok(signal) => signal,
        Err(e) => {
            warn!(error = %e, "⚠️ latest signal unreadable — starting without one");
            None
        }
    };
    let state = Arc::new(AppState::new(ledger, bot_config, latest_signal, config.api_key.clone()));

    if state.api_key.is_none() {
        warn!("⚠️ API_KEY not set — HTTP surface is open (dev mode)");
    }

    // ── 6. Supervisor task ────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor = Supervisor::new(state.clone(), exchange, inference, &config);
    let loop_handle = tokio::spawn(supervisor.run(shutdown_rx));

    // ── 7. Bind & Serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = config.bind_addr.parse()?;
    let app = routes::router(state);

    info!(?addr, "🚀 Tidewatch server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("🛑 shutdown requested");
        })
        .await?;

    // ── 8. Let the in-flight cycle finish ─────────────────────────────────────
    let _ = shutdown_tx.send(true);
    if let Err(e) = loop_handle.await {
        error!(error = %e, "supervisor task panicked");
    }

    info!("👋 bye");
    Ok(())
}
