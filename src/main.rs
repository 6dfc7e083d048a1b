//! tx-resubmitter - submit an EVM transaction and see it through to a receipt

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ethers::types::{Address, Bytes, H256, U256, U64};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use tx_resubmitter::config::{LogFormat, Settings};
use tx_resubmitter::metrics;
use tx_resubmitter::tx::{build_transfer, CallRequest, ContractMethod, ContractTransactor};
use tx_resubmitter::{
    ChainProvider, Ledger, LocalSigner, SenderError, SubmissionOutcome, TransactionResubmitter,
    TxSigner,
};

/// Submit transactions and drive them to confirmation.
#[derive(Parser)]
#[command(name = "tx-resubmitter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config TOML path
    #[arg(long, env = "TX_RESUBMITTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send value (and optional raw call data) to an address.
    Transfer {
        /// Recipient address.
        #[arg(long)]
        to: Address,

        /// Amount in wei.
        #[arg(long, default_value = "0", value_parser = parse_wei)]
        value: U256,

        /// Starting gas price in wei (node suggestion if omitted).
        #[arg(long, value_parser = parse_wei)]
        gas_price: Option<U256>,

        /// Gas limit (21000 or estimated if omitted).
        #[arg(long, value_parser = parse_wei)]
        gas_limit: Option<U256>,

        /// Hex-encoded call data.
        #[arg(long)]
        data: Option<String>,
    },

    /// Call a contract method.
    Call {
        /// Contract address.
        #[arg(long)]
        to: Address,

        /// Method signature, e.g. "transfer(address,uint256)", or a name with --abi.
        #[arg(long)]
        method: String,

        /// JSON ABI file to look the method up in.
        #[arg(long)]
        abi: Option<PathBuf>,

        /// Amount in wei sent with the call.
        #[arg(long, default_value = "0", value_parser = parse_wei)]
        value: U256,

        /// Method arguments.
        args: Vec<String>,
    },

    /// Print the current nonce of an account.
    Nonce {
        /// Account (the configured signer if omitted).
        #[arg(long)]
        address: Option<Address>,
    },

    /// Print the balance of an account in wei.
    Balance {
        /// Account (the configured signer if omitted).
        #[arg(long)]
        address: Option<Address>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::load(cli.config.as_deref())?;

    // Initialize logging
    init_logging(settings.log_format);

    info!("Starting tx-resubmitter v{}", env!("CARGO_PKG_VERSION"));
    for warning in settings.warnings() {
        warn!("{}", warning);
    }

    let provider = Arc::new(ChainProvider::new(settings.chain.clone())?);
    let result = run(cli.command, &settings, provider).await;

    if settings.metrics.enabled {
        if let Some(path) = &settings.metrics.textfile_path {
            if let Err(e) = metrics::write_textfile(Path::new(path)) {
                warn!("Failed to write metrics to {}: {}", path, e);
            }
        }
    }

    result
}

async fn run(command: Commands, settings: &Settings, provider: Arc<ChainProvider>) -> Result<()> {
    match command {
        Commands::Transfer {
            to,
            value,
            gas_price,
            gas_limit,
            data,
        } => {
            let signer = Arc::new(LocalSigner::load(&settings.wallet)?);
            let chain_id = provider.chain_id().await.map_err(SenderError::ChainId)?;
            let data = match data {
                Some(hex_data) => parse_hex(&hex_data)?,
                None => Bytes::default(),
            };

            let request = CallRequest {
                from: signer.account(),
                to: Some(to),
                value,
                gas: gas_limit,
                gas_price,
                data,
            };
            let tx = build_transfer(provider.as_ref(), request).await?;

            let resubmitter = TransactionResubmitter::new(provider, signer, chain_id)
                .with_error_table(settings.error_table());
            let outcome = resubmitter
                .transact_with_receipt(&settings.sender.control_params(), tx)
                .await;
            report(outcome)
        }
        Commands::Call {
            to,
            method,
            abi,
            value,
            args,
        } => {
            let signer = Arc::new(LocalSigner::load(&settings.wallet)?);
            let method = match abi {
                Some(path) => {
                    let abi_json = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read ABI file: {:?}", path))?;
                    ContractMethod::from_abi_json(&abi_json, &method)?
                }
                None => ContractMethod::parse(&method)?,
            };

            let transactor = ContractTransactor::new(provider, signer, to)
                .await?
                .with_value(value)
                .with_error_table(settings.error_table());
            let outcome = transactor
                .transact_with_receipt(&settings.sender.control_params(), &method, &args)
                .await;
            report(outcome)
        }
        Commands::Nonce { address } => {
            let account = resolve_account(address, settings)?;
            let nonce = provider.nonce_at(account).await.map_err(SenderError::NonceQuery)?;
            println!("{}", nonce);
            Ok(())
        }
        Commands::Balance { address } => {
            let account = resolve_account(address, settings)?;
            let balance = provider
                .balance_at(account)
                .await
                .with_context(|| format!("Failed to read balance of {:?}", account))?;
            println!("{}", balance);
            Ok(())
        }
    }
}

fn resolve_account(address: Option<Address>, settings: &Settings) -> Result<Address> {
    match address {
        Some(address) => Ok(address),
        None => Ok(LocalSigner::load(&settings.wallet)?.account()),
    }
}

/// Machine-readable summary of a submission
#[derive(Serialize)]
struct Report {
    status: &'static str,
    hash: Option<H256>,
    nonce: Option<u64>,
    gas_price: Option<U256>,
    block_number: Option<U64>,
    receipt_status: Option<U64>,
    error: Option<String>,
}

fn report(outcome: SubmissionOutcome) -> Result<()> {
    let signed = outcome.signed_transaction();
    let receipt = outcome.receipt();
    let summary = Report {
        status: match &outcome {
            SubmissionOutcome::Confirmed { .. } => "confirmed",
            SubmissionOutcome::Unconfirmed { .. } => "unconfirmed",
            SubmissionOutcome::Failed { .. } => "failed",
        },
        hash: signed.map(|s| s.hash),
        nonce: signed.map(|s| s.nonce()),
        gas_price: signed.map(|s| s.gas_price()),
        block_number: receipt.and_then(|r| r.block_number),
        receipt_status: receipt.and_then(|r| r.status),
        error: outcome.error().map(|e| e.to_string()),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    match outcome {
        SubmissionOutcome::Confirmed { .. } => Ok(()),
        SubmissionOutcome::Unconfirmed { signed } => {
            anyhow::bail!("Confirmation unknown for {:?}", signed.hash)
        }
        SubmissionOutcome::Failed { error, .. } => Err(error.into()),
    }
}

fn parse_wei(s: &str) -> Result<U256, String> {
    U256::from_dec_str(s).map_err(|e| format!("invalid amount {}: {}", s, e))
}

fn parse_hex(s: &str) -> Result<Bytes> {
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .with_context(|| format!("Invalid hex data: {}", s))?;
    Ok(Bytes::from(bytes))
}

fn init_logging(format: LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tx_resubmitter=debug,hyper=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
