//! Off-chain record journal
//!
//! Maps transfer outcomes onto the status of the record a reward settles,
//! and defines the store those statuses are written to.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transfer::types::{SubmissionReceipt, TransferOutcome};

/// Status of the off-chain record
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordStatus {
    /// Relayed, verification not yet finished
    Submitted,
    Approved,
    Failed,
    /// Outcome unknown; someone must look the receipt up by hand
    PendingManualCheck,
}

/// One write to the journal
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub context_id: String,
    pub status: RecordStatus,
    pub receipt: Option<SubmissionReceipt>,
    pub reason: Option<String>,
}

impl RecordUpdate {
    /// Journal entry written between relay and verification
    pub fn submitted(receipt: &SubmissionReceipt) -> Self {
        Self {
            context_id: receipt.context_id.clone(),
            status: RecordStatus::Submitted,
            receipt: Some(receipt.clone()),
            reason: None,
        }
    }

    pub fn from_outcome(context_id: &str, outcome: &TransferOutcome) -> Self {
        match outcome {
            TransferOutcome::Confirmed(receipt) => Self {
                context_id: context_id.to_string(),
                status: RecordStatus::Approved,
                receipt: Some(receipt.clone()),
                reason: None,
            },
            TransferOutcome::Failed { reason } => Self {
                context_id: context_id.to_string(),
                status: RecordStatus::Failed,
                receipt: None,
                reason: Some(reason.clone()),
            },
            TransferOutcome::Unverifiable {
                receipt,
                last_error,
            } => Self {
                context_id: context_id.to_string(),
                status: RecordStatus::PendingManualCheck,
                receipt: Some(receipt.clone()),
                reason: Some(last_error.clone()),
            },
        }
    }
}

/// Persisted form of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub context_id: String,
    pub status: RecordStatus,
    pub receipt: Option<SubmissionReceipt>,
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Fold an update into the existing record
    ///
    /// A receipt, once known, is kept even when a later update carries none.
    pub fn merge(existing: Option<StoredRecord>, update: &RecordUpdate) -> Self {
        let receipt = update
            .receipt
            .clone()
            .or_else(|| existing.and_then(|r| r.receipt));

        Self {
            context_id: update.context_id.clone(),
            status: update.status,
            receipt,
            reason: update.reason.clone(),
            updated_at: Utc::now(),
        }
    }

    pub fn receipt_id(&self) -> Option<&str> {
        self.receipt.as_ref().map(|r| r.id.as_str())
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn apply(&self, update: &RecordUpdate) -> Result<StoredRecord>;

    async fn get(&self, context_id: &str) -> Result<Option<StoredRecord>>;

    async fn list_by_status(&self, status: RecordStatus) -> Result<Vec<StoredRecord>>;
}

/// Explorer link for a transaction id
///
/// `cluster` is appended as a query parameter unless it is mainnet.
pub fn explorer_url(base: &str, id: &str, cluster: &str) -> String {
    let base = base.trim_end_matches('/');
    match cluster {
        "" | "mainnet" | "mainnet-beta" => format!("{}/tx/{}", base, id),
        cluster => format!("{}/tx/{}?cluster={}", base, id, cluster),
    }
}
