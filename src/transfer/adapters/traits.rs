//! Collaborator traits
//!
//! Defines the interface to the network node and to the key holder.

use async_trait::async_trait;

use crate::transfer::errors::{NetworkError, SignerError};
use crate::transfer::types::{
    Address, Commitment, Freshness, SendOptions, SignatureStatus, SignedTransaction,
    SubmissionReceipt, TransactionRecord, UnsignedTransaction,
};

/// Network node adapter
///
/// Every call is a single request; retries and timeouts are decided by the
/// stage that makes the call.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Recent blockhash and the last block height it stays valid for
    async fn get_latest_blockhash(&self) -> Result<Freshness, NetworkError>;

    /// Balance in base units
    async fn get_balance(&self, address: &Address) -> Result<u64, NetworkError>;

    /// Relay a signed transaction, returning its id
    async fn send_transaction(
        &self,
        tx: &SignedTransaction,
        opts: &SendOptions,
    ) -> Result<String, NetworkError>;

    /// Resolve once the receipt reaches `level`
    ///
    /// May never resolve; callers race it against their own timeout.
    /// Fails with `BlockHeightExceeded` once the receipt can no longer land.
    async fn confirm_transaction(
        &self,
        receipt: &SubmissionReceipt,
        level: Commitment,
    ) -> Result<(), NetworkError>;

    /// Full transaction record, `None` while the node has not seen it
    async fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>, NetworkError>;

    /// Lightweight status, `None` when the node knows nothing about it
    async fn get_signature_status(&self, id: &str) -> Result<Option<SignatureStatus>, NetworkError>;
}

/// Key holder adapter (browser wallet, hardware key, local keypair)
///
/// Signing may take unbounded time; no timeout is imposed here.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Authorize the transaction. A declined prompt must surface as
    /// `SignerError::UserRejected`.
    async fn sign_transaction(
        &self,
        unsigned: &UnsignedTransaction,
    ) -> Result<SignedTransaction, SignerError>;

    /// Get signer name for logging
    fn name(&self) -> &str;
}
