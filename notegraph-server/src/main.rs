use std::sync::Arc;

use clap::Parser;
use notegraph_core::NotegraphConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use notegraph_server::{server, subsystems, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "notegraph.toml")]
    config: String,

    /// Check store connectivity and exit.
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match NotegraphConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let threads = match config.linking.worker_threads {
        0 => num_cpus::get(),
        n => n,
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("notegraph-pairs-{}", i))
        .build_global()?;
    tracing::info!(threads, "Pair evaluation pool ready");

    let state = match AppState::connect(config.clone()).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to initialise store: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        let resp =
            notegraph_server::router::handle_request(notegraph_core::ipc::NotegraphRequest::Health, &state)
                .await;
        match (resp.is_ok(), resp.data, resp.error) {
            (true, Some(data), _) => {
                println!("✅ Store healthy: {}", data);
                return Ok(());
            }
            (_, _, err) => {
                println!("❌ Health check failed: {}", err.unwrap_or_default());
                std::process::exit(1);
            }
        }
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    tokio::spawn(subsystems::backfill::run_backfill_worker(
        state.clone(),
        tx.subscribe(),
    ));

    if config.http.enabled {
        let http_state = state.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = notegraph_server::http::start_http_server(http_state, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = shellexpand::tilde(&config.service.socket_path).to_string();
    server::run_unix_server(&socket_path, state, tx.subscribe()).await?;

    Ok(())
}
