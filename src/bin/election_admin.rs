use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dpos_relay::config::{LedgerArgs, RelayConfig};
use dpos_relay::{
    banner, AlloyLedger, Credential, ElectionClient, TransactionRecord, TxError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// DPoS election admin CLI
#[derive(Parser)]
#[command(name = "election_admin")]
#[command(about = "Inspect and drive the DPoS election contract", long_about = None)]
struct Cli {
    #[command(flatten)]
    ledger: LedgerArgs,

    /// Private key for signing transactions
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether the election is running and the current winner
    Status,

    /// Print the current winner
    Winner,

    /// Start the election
    Start,

    /// End the election
    End,

    /// Vote for a candidate
    Vote {
        /// Candidate address
        candidate: Address,

        /// Voter address; defaults to the signer's address
        #[arg(long)]
        voter: Option<Address>,
    },

    /// Wait for a transaction submitted elsewhere to settle
    Wait {
        /// Transaction hash (0x-prefixed)
        tx_hash: B256,

        /// Override the configured confirmation timeout
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn signer(private_key: Option<&str>) -> Result<Credential> {
    let key = private_key.context("PRIVATE_KEY is required for this command")?;
    Ok(Credential::from_private_key(key)?)
}

/// Print the outcome of a write; a failed one still shows the tracked record when there is one.
async fn report(
    client: &ElectionClient,
    outcome: Result<TransactionRecord, TxError>,
) -> Result<()> {
    match outcome {
        Ok(record) => {
            println!("{}", banner::transaction(&record));
            Ok(())
        }
        Err(e) => {
            if let Some(id) = e.transaction_id() {
                if let Ok(record) = client.manager().get_status(id).await {
                    println!("{}", banner::transaction(&record));
                }
            }
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .from_env_lossy()
        .add_directive("alloy=warn".parse()?);

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();
    let config = RelayConfig::load(&cli.ledger)?;
    let ledger = AlloyLedger::connect(&config.ledger.rpc_url).await?;
    let client = ElectionClient::from_config(&config, Arc::new(ledger))?;
    let private_key = cli.private_key.as_deref();

    match cli.command {
        Commands::Status => {
            let active = client.election_active().await?;
            // getWinner reverts until there is a result.
            let winner = client.winner().await.ok().filter(|w| *w != Address::ZERO);
            println!(
                "{}",
                banner::election_status(client.contract(), &config.ledger.rpc_url, active, winner)
            );
        }

        Commands::Winner => {
            let winner = client.winner().await?;
            println!("Winner: {winner}");
        }

        Commands::Start => {
            let admin = signer(private_key)?;
            report(&client, client.start_election(admin).await).await?;
        }

        Commands::End => {
            let admin = signer(private_key)?;
            report(&client, client.end_election(admin).await).await?;
        }

        Commands::Vote { candidate, voter } => {
            let credential = signer(private_key)?;
            let voter = voter.unwrap_or_else(|| credential.address());
            report(&client, client.cast_vote(voter, candidate, credential).await).await?;
        }

        Commands::Wait {
            tx_hash,
            timeout_ms,
        } => {
            let settings = client.confirmation();
            let timeout = timeout_ms.map_or(settings.timeout, Duration::from_millis);
            client.manager().track(tx_hash, "external").await;
            let outcome = client
                .manager()
                .await_confirmation(tx_hash, timeout, settings.poll)
                .await;
            report(&client, outcome).await?;
        }
    }

    Ok(())
}
