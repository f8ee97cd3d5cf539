use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use landmark_ledger::{
    config::{load_config, LedgerConfig},
    contracts::{chain_info, ContractClient, LandmarkMetadata, SimulatedContract, KNOWN_CHAINS},
    session::{ChainId, StaticSession},
    store::FileStore,
    ClaimLedger,
};

#[derive(Parser, Debug)]
#[command(name = "landmark-ledger", about = "Claim and mint landmark NFTs for a wallet address")]
struct Args {
    /// TOML config file; flags below override its values.
    #[arg(long, env = "LANDMARK_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "LANDMARK_ADDRESS")]
    address: Option<String>,

    #[arg(long, env = "LANDMARK_CHAIN_ID")]
    chain_id: Option<ChainId>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Wallet(WalletCommand),
    /// List chains that carry the landmark contract.
    Chains,
}

/// Subcommands that act on the ledger of one wallet address.
#[derive(Subcommand, Debug)]
enum WalletCommand {
    /// Claim a landmark locally, without a transaction.
    Claim { landmark_id: String },
    /// Mint a landmark NFT through the simulated contract.
    Mint {
        landmark_id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        image: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        country: Option<String>,
        /// Include the transaction in a block right away.
        #[arg(long)]
        confirm: bool,
    },
    /// Report a transaction as confirmed.
    Confirm { tx_hash: String },
    /// Show totals, or the state of one landmark.
    Status { landmark_id: Option<String> },
    /// Print every record of the address.
    List,
    /// Record a visit for a minted token.
    Visit { token_id: u64 },
}

fn resolve_config(args: &Args) -> Result<LedgerConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(chain_id) = args.chain_id {
        config.chain_id = chain_id;
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_chains() -> Result<()> {
    let chains: Vec<_> = KNOWN_CHAINS
        .iter()
        .map(|c| {
            json!({
                "chain_id": c.chain_id,
                "name": c.name,
                "currency": c.currency_symbol,
                "contract": c.contract_address,
            })
        })
        .collect();
    print_json(&json!(chains))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    let command = match args.command {
        Command::Chains => return print_chains(),
        Command::Wallet(command) => command,
    };

    let session = StaticSession {
        address: args.address.clone().map(Into::into),
        chain_id: Some(config.chain_id),
    };
    let mut ledger = ClaimLedger::with_config(FileStore::new(&config.data_dir), &config);
    ledger.sync_session(&session);
    if ledger.address().is_none() {
        bail!("no wallet address; pass --address or set LANDMARK_ADDRESS");
    }
    // the simulated chain starts from what this wallet already has on chain
    let contract = SimulatedContract::new(config.chain_id)
        .with_total_minted(ledger.totals().on_chain as u64);

    match command {
        WalletCommand::Claim { landmark_id } => {
            if !ledger.claim_locally(&landmark_id) {
                info!(%landmark_id, "already claimed");
            }
            print_json(&json!({
                "landmark_id": landmark_id,
                "claimed": ledger.is_claimed(&landmark_id),
            }))?;
        }
        WalletCommand::Mint {
            landmark_id,
            name,
            description,
            image,
            location,
            country,
            confirm,
        } => {
            let metadata = LandmarkMetadata {
                name,
                description,
                image,
                location,
                country,
            };
            let chain = chain_info(contract.chain_id());
            let tx_hash = match ledger.start_mint(&contract, &landmark_id, &metadata).await {
                Ok(tx_hash) => tx_hash,
                Err(err) if err.is_benign() => {
                    warn!(%landmark_id, "{err}");
                    return Ok(());
                }
                Err(err) => return Err(err).context("mint failed"),
            };
            if confirm {
                contract.confirm(&tx_hash);
                ledger.poll_confirmations();
            }
            print_json(&json!({
                "landmark_id": landmark_id,
                "tx_hash": tx_hash,
                "chain": chain.name,
                "price_wei": contract.mint_price().map(|p| p.to_string()),
                "currency": chain.currency_symbol,
                "on_chain": ledger.is_minted(&landmark_id),
            }))?;
        }
        WalletCommand::Confirm { tx_hash } => {
            let changed = ledger.on_transaction_confirmed(&tx_hash);
            print_json(&json!({ "tx_hash": tx_hash, "changed": changed }))?;
        }
        WalletCommand::Status { landmark_id: Some(landmark_id) } => {
            print_json(&json!({
                "landmark_id": landmark_id,
                "claimed": ledger.is_claimed(&landmark_id),
                "minted": ledger.is_minted(&landmark_id),
                "record": ledger.record(&landmark_id),
            }))?;
        }
        WalletCommand::Status { landmark_id: None } => {
            let totals = ledger.totals();
            print_json(&json!({
                "address": ledger.address(),
                "chain": chain_info(config.chain_id).name,
                "claimed": totals.claimed,
                "minted": totals.reported_minted(contract.total_minted()),
            }))?;
        }
        WalletCommand::List => print_json(&serde_json::to_value(ledger.records())?)?,
        WalletCommand::Visit { token_id } => {
            let tx_hash = contract
                .visit_landmark(token_id)
                .await
                .with_context(|| format!("visit of token {token_id} failed"))?;
            print_json(&json!({ "token_id": token_id, "tx_hash": tx_hash }))?;
        }
    }

    ledger.flush().context("failed to persist claim bucket")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn chains_needs_no_wallet() {
        let args = Args::try_parse_from(["landmark-ledger", "chains"]).unwrap();
        assert!(matches!(args.command, Command::Chains));
    }

    #[test]
    fn wallet_subcommands_parse_at_top_level() {
        let args =
            Args::try_parse_from(["landmark-ledger", "--address", "0xabc", "claim", "eiffel"])
                .unwrap();
        assert!(matches!(
            args.command,
            Command::Wallet(WalletCommand::Claim { ref landmark_id }) if landmark_id == "eiffel"
        ));
        let args = Args::try_parse_from(["landmark-ledger", "status"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Wallet(WalletCommand::Status { landmark_id: None })
        ));
    }
}
