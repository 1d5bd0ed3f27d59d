use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::time::Duration;

use crate::transfer::coordinator::SubmitOptions;
use crate::transfer::types::Commitment;
use crate::transfer::verifier::VerifierConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    // Node
    pub rpc_url: String,
    pub commitment: Commitment,
    pub explorer_url: String,
    pub cluster: String,

    /// Base58 64-byte secret of the paying keypair
    #[serde(default)]
    pub keypair: Option<String>,

    // Submission
    pub estimated_fee_lamports: u64,
    pub send_max_retries: usize,
    pub skip_preflight: bool,

    // Verification
    pub confirm_timeout_secs: u64,
    pub lookup_attempts: u32,
    pub lookup_delay_ms: u64,
    pub amount_tolerance_lamports: u64,
    pub strict_amount_check: bool,

    // Record journal
    pub store_path: String,

    // Logging
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
}

impl AppConfig {
    pub fn submit_options(&self) -> SubmitOptions {
        SubmitOptions {
            skip_preflight: self.skip_preflight,
            preflight_commitment: self.commitment,
            max_retries: self.send_max_retries,
            estimated_fee: self.estimated_fee_lamports,
        }
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            confirm_timeout: Duration::from_secs(self.confirm_timeout_secs),
            lookup_attempts: self.lookup_attempts,
            lookup_delay: Duration::from_millis(self.lookup_delay_ms),
            commitment: self.commitment,
            amount_tolerance: self.amount_tolerance_lamports,
            strict_amount_check: self.strict_amount_check,
        }
    }
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    let s = Config::builder()
        // Set defaults
        .set_default("rpc_url", "https://api.devnet.solana.com")?
        .set_default("commitment", "confirmed")?
        .set_default("explorer_url", "https://explorer.solana.com")?
        .set_default("cluster", "devnet")?
        .set_default("estimated_fee_lamports", 5_000)?
        .set_default("send_max_retries", 3)?
        .set_default("skip_preflight", false)?
        .set_default("confirm_timeout_secs", 60)?
        .set_default("lookup_attempts", 5)?
        .set_default("lookup_delay_ms", 2_000)?
        .set_default("amount_tolerance_lamports", 0)?
        .set_default("strict_amount_check", false)?
        .set_default("store_path", "data/reward_records")?
        .set_default("log_level", "info")?
        .set_default("log_to_file", false)?
        .set_default("log_file", "log/reward_transfer.log")?
        // Add configuration from a file
        .add_source(File::with_name(path).required(false))
        // Add configuration from environment variables
        .add_source(config::Environment::with_prefix("APP"))
        .build()?;

    s.try_deserialize()
}
