//! Voting ledger node binary

use anyhow::Context;
use voting_ledger::{Config, Error, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting voting ledger node");

    // Load configuration
    let config = match std::env::var("VOTING_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        Err(_) => Config::from_env().context("loading config from environment")?,
    };

    // Open ledger
    let ledger = Ledger::open(config).await.context("opening ledger")?;
    tracing::info!(
        candidates = ledger.candidates_count(),
        votes = ledger.total_votes(),
        signed = ledger.public_key().is_some(),
        "Ledger opened successfully"
    );

    for candidate in ledger.get_candidates() {
        tracing::info!(
            id = %candidate.id,
            name = %candidate.name,
            votes = candidate.vote_count,
            "Candidate"
        );
    }

    match ledger.get_results() {
        Ok(result) => tracing::info!(
            winner = %result.winner_name,
            votes = result.winner_vote_count,
            "Current leader"
        ),
        Err(Error::NoCandidates) => tracing::warn!("No candidates registered"),
        Err(e) => return Err(e.into()),
    }

    let head = ledger.verify_audit_log().await.context("verifying audit log")?;
    tracing::info!(sequence = head.sequence, "Audit log verified");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down voting ledger node");
    ledger.shutdown().await?;
    Ok(())
}
