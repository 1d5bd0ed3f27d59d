//! Core types for the reward transfer pipeline
//!
//! Every stage produces the next stage's input:
//! `TransferIntent -> UnsignedTransaction -> SignedTransaction -> SubmissionReceipt -> TransferOutcome`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transfer::errors::TransferError;
use crate::transfer::wire;

/// Base units per whole token (nine decimal places)
pub const BASE_UNITS_PER_TOKEN: u64 = 1_000_000_000;

/// Base58-encoded account address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode into the raw 32-byte public key
    pub fn to_bytes(&self) -> Result<[u8; 32], String> {
        wire::decode_pubkey(&self.0)
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Convert a human-readable amount into base units
///
/// Truncates toward zero so a reward is never over-paid.
pub fn to_base_units(amount: Decimal) -> Result<u64, TransferError> {
    if amount <= Decimal::ZERO {
        return Err(TransferError::InvalidIntent(format!(
            "amount must be positive, got {}",
            amount
        )));
    }

    let scaled = amount
        .checked_mul(Decimal::from(BASE_UNITS_PER_TOKEN))
        .ok_or_else(|| TransferError::InvalidIntent(format!("amount {} overflows", amount)))?
        .trunc();

    let units = scaled
        .to_u64()
        .ok_or_else(|| TransferError::InvalidIntent(format!("amount {} overflows", amount)))?;

    if units == 0 {
        return Err(TransferError::InvalidIntent(format!(
            "amount {} is below the smallest unit",
            amount
        )));
    }

    Ok(units)
}

/// Convert base units back into a display amount
pub fn from_base_units(units: u64) -> Decimal {
    Decimal::from_i128_with_scale(units as i128, 9).normalize()
}

/// Logical request to pay a reward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferIntent {
    /// Operator-controlled account paying the reward
    pub payer: Address,
    /// Beneficiary account
    pub payee: Address,
    /// Amount in whole tokens (fixed point)
    pub amount: Decimal,
    /// Off-chain record this transfer settles (e.g. a submission id)
    pub context_id: String,
}

/// Recent blockhash plus the last block height at which it is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freshness {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

/// Network-ready transfer, not yet authorized
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    pub payer: Address,
    pub payee: Address,
    pub lamports: u64,
    pub context_id: String,
    pub freshness: Freshness,
    /// Serialized message the signer must sign
    pub message: Vec<u8>,
}

/// Authorized transaction ready for relay
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    pub signatures: Vec<[u8; 64]>,
    pub message: Vec<u8>,
}

impl SignedTransaction {
    /// The first signature doubles as the transaction id
    pub fn id(&self) -> Option<String> {
        self.signatures
            .first()
            .map(|sig| bs58::encode(sig).into_string())
    }

    /// Full wire encoding (signatures followed by message)
    pub fn serialize(&self) -> Vec<u8> {
        wire::encode_transaction(&self.signatures, &self.message)
    }
}

/// Network-assigned id for a submitted transfer, plus what it was submitted with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub id: String,
    pub blockhash: String,
    pub last_valid_block_height: u64,
    pub payee: Address,
    pub lamports: u64,
    pub context_id: String,
}

/// Terminal result of verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// The network executed the transfer
    Confirmed(SubmissionReceipt),
    /// The network executed the transfer and it failed, or it can no longer land
    Failed { reason: String },
    /// Could not prove either way; the transfer may still have succeeded
    Unverifiable {
        receipt: SubmissionReceipt,
        last_error: String,
    },
}

impl TransferOutcome {
    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        match self {
            TransferOutcome::Confirmed(receipt) => Some(receipt),
            TransferOutcome::Unverifiable { receipt, .. } => Some(receipt),
            TransferOutcome::Failed { .. } => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, TransferOutcome::Confirmed(_))
    }
}

/// Commitment level requested from the network
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

/// Options passed to the relay call
#[derive(Debug, Clone, PartialEq)]
pub struct SendOptions {
    pub skip_preflight: bool,
    pub preflight_commitment: Commitment,
    pub max_retries: usize,
}

/// Full transaction record as returned by a lookup
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionRecord {
    pub slot: u64,
    /// Embedded execution error, if the transaction failed on chain
    pub err: Option<String>,
    pub fee: u64,
    pub account_keys: Vec<Address>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
}

impl TransactionRecord {
    /// Signed balance change of `address` in base units
    pub fn balance_delta(&self, address: &Address) -> Option<i128> {
        let idx = self.account_keys.iter().position(|k| k == address)?;
        let pre = *self.pre_balances.get(idx)?;
        let post = *self.post_balances.get(idx)?;
        Some(post as i128 - pre as i128)
    }
}

/// Lightweight signature status
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureStatus {
    pub slot: u64,
    pub confirmations: Option<u64>,
    pub err: Option<String>,
    pub confirmation_status: Option<Commitment>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_to_base_units_scales_by_nine_decimals() {
        assert_eq!(to_base_units(Decimal::new(5, 2)).unwrap(), 50_000_000);
        assert_eq!(to_base_units(Decimal::from(1)).unwrap(), 1_000_000_000);
        assert_eq!(to_base_units(Decimal::from_str("0.3").unwrap()).unwrap(), 300_000_000);
    }

    #[test]
    fn test_to_base_units_truncates() {
        // 1.9999999999 -> 1_999_999_999 (tenth decimal dropped)
        let amount = Decimal::from_str("1.9999999999").unwrap();
        assert_eq!(to_base_units(amount).unwrap(), 1_999_999_999);
    }

    #[test]
    fn test_to_base_units_rejects_non_positive_and_dust() {
        assert!(matches!(to_base_units(Decimal::ZERO), Err(TransferError::InvalidIntent(_))));
        assert!(matches!(to_base_units(Decimal::from(-1)), Err(TransferError::InvalidIntent(_))));
        let dust = Decimal::from_str("0.0000000001").unwrap();
        assert!(matches!(to_base_units(dust), Err(TransferError::InvalidIntent(_))));
    }

    #[test]
    fn test_to_base_units_rejects_overflow() {
        let huge = Decimal::from_str("100000000000").unwrap(); // 1e20 base units
        assert!(matches!(to_base_units(huge), Err(TransferError::InvalidIntent(_))));
    }

    #[test]
    fn test_from_base_units() {
        assert_eq!(from_base_units(50_000_000).to_string(), "0.05");
        assert_eq!(from_base_units(1_000_000_000).to_string(), "1");
    }

    #[test]
    fn test_commitment_strings() {
        assert_eq!(Commitment::Confirmed.as_ref(), "confirmed");
        assert_eq!("finalized".parse::<Commitment>().unwrap(), Commitment::Finalized);
        assert!(Commitment::Finalized > Commitment::Confirmed);
        assert!(Commitment::Confirmed > Commitment::Processed);
    }

    #[test]
    fn test_balance_delta() {
        let record = TransactionRecord {
            account_keys: vec![Address::new("A"), Address::new("B")],
            pre_balances: vec![1_000, 10],
            post_balances: vec![400, 600],
            ..Default::default()
        };
        assert_eq!(record.balance_delta(&Address::new("A")), Some(-600));
        assert_eq!(record.balance_delta(&Address::new("B")), Some(590));
        assert_eq!(record.balance_delta(&Address::new("C")), None);
    }

    #[test]
    fn test_outcome_json_is_tagged() {
        let outcome = TransferOutcome::Failed {
            reason: "InstructionError".to_string(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"failed\""));
        assert!(outcome.receipt().is_none());
    }
}
