use anyhow::{Context, Result};
use clap::Parser;
use dpos_relay::config::{LedgerArgs, RelayConfig};
use dpos_relay::server::{router, AppState};
use dpos_relay::{AlloyLedger, ElectionClient};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// CLI arguments for the relay server
#[derive(Parser, Debug)]
#[command(name = "relay_server")]
#[command(about = "DPoS relay - submits election transactions and tracks their confirmation", long_about = None)]
struct CliArgs {
    #[command(flatten)]
    ledger: LedgerArgs,

    /// Address to bind the HTTP API to
    #[arg(long, env = "LISTEN_ADDR")]
    listen_addr: Option<String>,
}

/// Setup shutdown signal handler (Ctrl+C / SIGTERM)
async fn shutdown_signal(shutdown_token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        use tracing::error;

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(err), _) | (_, Err(err)) => {
                    error!(error = %err, "Failed to register shutdown signal handlers");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Shutdown signal received (SIGTERM)");
            }
            _ = sigint.recv() => {
                info!("Shutdown signal received (SIGINT/Ctrl+C)");
            }
        }

        shutdown_token.cancel();
    }

    #[cfg(not(unix))]
    {
        use tracing::error;

        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received (Ctrl+C)");
                shutdown_token.cancel();
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for shutdown signal");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .from_env_lossy()
        .add_directive("alloy=warn".parse()?)
        .add_directive("dpos_relay=info".parse()?)
        .add_directive("relay_server=info".parse()?);

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true))
        .with(filter)
        .init();

    let cli_args = CliArgs::parse();
    let mut config = RelayConfig::load(&cli_args.ledger)?;
    if let Some(listen_addr) = cli_args.listen_addr {
        config.server.listen_addr = listen_addr;
    }

    let ledger = AlloyLedger::connect(&config.ledger.rpc_url).await?;
    let client = ElectionClient::from_config(&config, Arc::new(ledger))?;
    let manager = client.manager().clone();
    let state = Arc::new(AppState::new(client));

    let shutdown_token = CancellationToken::new();
    let shutdown_token_clone = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(shutdown_token_clone).await;
    });

    // Records are also pruned on submit; this covers idle periods.
    let prune_token = shutdown_token.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = prune_token.cancelled() => break,
                _ = ticker.tick() => {
                    manager.prune_expired().await;
                }
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen_addr))?;
    info!(
        listen_addr = %config.server.listen_addr,
        contract = %state.client.contract(),
        "Relay listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}
