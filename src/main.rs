use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::{eyre, Result, WrapErr};
use rust_decimal::Decimal;

use reward_transfer::configure::{self, AppConfig};
use reward_transfer::logger::setup_logger;
use reward_transfer::record_store::SledRecordStore;
use reward_transfer::transfer::adapters::{KeypairSigner, NetworkClient, RpcNetworkClient, WalletSigner};
use reward_transfer::transfer::errors::SignerError;
use reward_transfer::transfer::types::{from_base_units, SignedTransaction, UnsignedTransaction};
use reward_transfer::transfer::{
    explorer_url, Address, ConfirmationVerifier, LogObserver, RecordStatus, RecordStore,
    SigningCoordinator, StoredRecord, TransferError, TransferIntent, TransferOutcome,
    TransferPipeline,
};

#[derive(Parser)]
#[command(author, version, about = "Pay and verify on-chain rewards", long_about = None)]
struct Cli {
    /// Config file (defaults to config/config.yaml)
    #[arg(long, default_value = configure::DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pay a reward from the configured keypair and verify it
    Send {
        #[arg(long)]
        payee: String,
        /// Amount in whole tokens, e.g. 0.05
        #[arg(long)]
        amount: String,
        /// Off-chain record this payment settles
        #[arg(long)]
        context_id: String,
        /// Sign without asking for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Re-run verification for a journaled transfer
    Verify {
        #[arg(long)]
        context_id: String,
    },
    /// Show the journaled record for a context id
    Status {
        #[arg(long)]
        context_id: String,
    },
    /// List transfers that still need attention
    Pending,
    /// Show an account balance (defaults to the configured keypair)
    Balance {
        #[arg(long)]
        address: Option<String>,
    },
}

/// Asks on the terminal before handing the transaction to the keypair
struct ConsoleApprovalSigner {
    inner: KeypairSigner,
}

#[async_trait]
impl WalletSigner for ConsoleApprovalSigner {
    async fn sign_transaction(
        &self,
        unsigned: &UnsignedTransaction,
    ) -> Result<SignedTransaction, SignerError> {
        let prompt = format!(
            "Send {} tokens from {} to {} for {}? [y/N] ",
            from_base_units(unsigned.lamports),
            unsigned.payer,
            unsigned.payee,
            unsigned.context_id
        );

        let approved = tokio::task::spawn_blocking(move || {
            use std::io::Write;
            print!("{}", prompt);
            std::io::stdout().flush().ok();
            let mut answer = String::new();
            std::io::stdin()
                .read_line(&mut answer)
                .map(|_| matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
        })
        .await
        .map_err(|e| SignerError::Unavailable(format!("prompt task failed: {}", e)))?
        .map_err(|e| SignerError::Unavailable(format!("cannot read terminal: {}", e)))?;

        if !approved {
            return Err(SignerError::UserRejected);
        }
        self.inner.sign_transaction(unsigned).await
    }

    fn name(&self) -> &str {
        "keypair (console approval)"
    }
}

/// Stand-in for sessions that only read and verify
struct ReadOnlySigner;

#[async_trait]
impl WalletSigner for ReadOnlySigner {
    async fn sign_transaction(
        &self,
        _unsigned: &UnsignedTransaction,
    ) -> Result<SignedTransaction, SignerError> {
        Err(SignerError::Unavailable("read-only session".to_string()))
    }

    fn name(&self) -> &str {
        "read-only"
    }
}

fn open_store(config: &AppConfig) -> Result<SledRecordStore> {
    SledRecordStore::open(&config.store_path).map_err(|e| eyre!("{:#}", e))
}

fn load_keypair(config: &AppConfig) -> Result<KeypairSigner> {
    let secret = config
        .keypair
        .as_deref()
        .ok_or_else(|| eyre!("no keypair configured (set APP_KEYPAIR)"))?;
    KeypairSigner::from_base58(secret).map_err(|e| eyre!("{}", e))
}

fn print_record(config: &AppConfig, record: &StoredRecord) {
    println!("context:   {}", record.context_id);
    println!("status:    {}", record.status);
    if let Some(receipt) = &record.receipt {
        println!("receipt:   {}", receipt.id);
        println!("payee:     {}", receipt.payee);
        println!("amount:    {}", from_base_units(receipt.lamports));
        println!(
            "explorer:  {}",
            explorer_url(&config.explorer_url, &receipt.id, &config.cluster)
        );
    }
    if let Some(reason) = &record.reason {
        println!("reason:    {}", reason);
    }
    println!("updated:   {}", record.updated_at.to_rfc3339());
}

fn print_outcome(config: &AppConfig, outcome: &TransferOutcome) {
    match outcome {
        TransferOutcome::Confirmed(receipt) => {
            println!("✅ Confirmed: {}", receipt.id);
            println!(
                "   {}",
                explorer_url(&config.explorer_url, &receipt.id, &config.cluster)
            );
        }
        TransferOutcome::Failed { reason } => {
            println!("❌ Failed: {}", reason);
        }
        TransferOutcome::Unverifiable {
            receipt,
            last_error,
        } => {
            println!("⚠️  Could not verify {} ({})", receipt.id, last_error);
            println!("   The transfer may still have succeeded. Check it manually:");
            println!(
                "   {}",
                explorer_url(&config.explorer_url, &receipt.id, &config.cluster)
            );
        }
    }
}

fn build_pipeline(
    config: &AppConfig,
    network: Arc<dyn NetworkClient>,
    signer: Arc<dyn WalletSigner>,
    store: Arc<dyn RecordStore>,
) -> TransferPipeline {
    TransferPipeline::new(
        network,
        signer,
        SigningCoordinator::new(config.submit_options()),
        ConfirmationVerifier::new(config.verifier_config()),
    )
    .with_store(store)
    .with_observer(Arc::new(LogObserver))
}

/// 0 when confirmed, 2 when relayed but not confirmed, 1 when nothing was paid
fn send_exit_code(result: &std::result::Result<TransferOutcome, TransferError>) -> u8 {
    match result {
        Ok(outcome) if outcome.is_confirmed() => 0,
        Ok(_) => 2,
        Err(_) => 1,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv().ok();
    let cli = Cli::parse();

    let config = configure::load_config_from(&cli.config).wrap_err("failed to load configuration")?;
    setup_logger(&config).map_err(|e| eyre!("failed to initialize logger: {}", e))?;

    log::info!("Using node {} ({})", config.rpc_url, config.cluster);
    let network: Arc<dyn NetworkClient> = Arc::new(
        RpcNetworkClient::new(config.rpc_url.clone(), config.commitment)
            .map_err(|e| eyre!("{}", e))?,
    );

    match cli.command {
        Commands::Send {
            payee,
            amount,
            context_id,
            yes,
        } => {
            let amount = Decimal::from_str(&amount).wrap_err("amount must be a decimal number")?;
            let keypair = load_keypair(&config)?;
            let intent = TransferIntent {
                payer: keypair.address().clone(),
                payee: Address::new(payee),
                amount,
                context_id,
            };

            let signer: Arc<dyn WalletSigner> = if yes {
                Arc::new(keypair)
            } else {
                Arc::new(ConsoleApprovalSigner { inner: keypair })
            };
            let store = Arc::new(open_store(&config)?);
            let pipeline = build_pipeline(&config, network, signer, store);

            let result = pipeline.run(&intent).await;
            match &result {
                Ok(outcome) => print_outcome(&config, outcome),
                Err(e) => eprintln!("❌ {} [{}]", e.user_message(), e.error_code()),
            }
            drop(pipeline);
            log::logger().flush();
            return Ok(ExitCode::from(send_exit_code(&result)));
        }
        Commands::Verify { context_id } => {
            let store = Arc::new(open_store(&config)?);
            let pipeline = build_pipeline(&config, network, Arc::new(ReadOnlySigner), store);

            let outcome = pipeline
                .resume(&context_id)
                .await
                .map_err(|e| eyre!("{}", e))?;
            print_outcome(&config, &outcome);
        }
        Commands::Status { context_id } => {
            let store = open_store(&config)?;
            let record = store.get(&context_id).await.map_err(|e| eyre!("{:#}", e))?;
            match record {
                Some(record) => print_record(&config, &record),
                None => println!("No record for {}", context_id),
            }
        }
        Commands::Pending => {
            let store = open_store(&config)?;
            let mut records = Vec::new();
            for status in [RecordStatus::Submitted, RecordStatus::PendingManualCheck] {
                records.extend(
                    store
                        .list_by_status(status)
                        .await
                        .map_err(|e| eyre!("{:#}", e))?,
                );
            }

            if records.is_empty() {
                println!("Nothing pending");
            }
            for record in &records {
                print_record(&config, record);
                println!();
            }
        }
        Commands::Balance { address } => {
            let address = match address {
                Some(a) => Address::new(a),
                None => load_keypair(&config)?.address().clone(),
            };
            let lamports = network
                .get_balance(&address)
                .await
                .map_err(|e| eyre!("{}", e))?;
            println!("{}: {} ({} base units)", address, from_base_units(lamports), lamports);
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reward_transfer::transfer::SubmissionReceipt;

    fn receipt() -> SubmissionReceipt {
        SubmissionReceipt {
            id: "sig123".to_string(),
            blockhash: "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N".to_string(),
            last_valid_block_height: 500,
            payee: Address::new("8qbHbw2BbbTHBW1sbeqakYXVKRQM8Ne7pLK7m6CVfeR"),
            lamports: 50_000_000,
            context_id: "sub-42".to_string(),
        }
    }

    #[test]
    fn test_send_exit_codes() {
        assert_eq!(send_exit_code(&Ok(TransferOutcome::Confirmed(receipt()))), 0);
        assert_eq!(
            send_exit_code(&Ok(TransferOutcome::Unverifiable {
                receipt: receipt(),
                last_error: "timeout".to_string(),
            })),
            2
        );
        assert_eq!(
            send_exit_code(&Ok(TransferOutcome::Failed {
                reason: "expired".to_string(),
            })),
            2
        );
        assert_eq!(send_exit_code(&Err(TransferError::UserRejected)), 1);
        assert_eq!(
            send_exit_code(&Err(TransferError::AlreadySubmitted {
                context_id: "sub-42".to_string(),
                receipt_id: "sig123".to_string(),
            })),
            1
        );
    }
}
