//! Signing Coordinator
//!
//! Hands a built transaction to the wallet and relays the signed result.

use std::sync::Arc;

use crate::transfer::adapters::{NetworkClient, WalletSigner};
use crate::transfer::errors::{NetworkError, SignerError, TransferError};
use crate::transfer::observer::{self, PhaseObserver, PhaseTracker};
use crate::transfer::state::{TransferEvent, TransferPhase};
use crate::transfer::types::{Commitment, SendOptions, SubmissionReceipt, UnsignedTransaction};

/// Submission settings
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Skip the node's simulation before relay
    pub skip_preflight: bool,
    pub preflight_commitment: Commitment,
    /// Relay retries performed by the node
    pub max_retries: usize,
    /// Fee headroom for the balance pre-check (base units)
    pub estimated_fee: u64,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            preflight_commitment: Commitment::Confirmed,
            max_retries: 3,
            estimated_fee: 5_000,
        }
    }
}

/// Signing Coordinator - wallet authorization and relay
pub struct SigningCoordinator {
    options: SubmitOptions,
    observer: Arc<dyn PhaseObserver>,
}

impl SigningCoordinator {
    pub fn new(options: SubmitOptions) -> Self {
        Self {
            options,
            observer: observer::noop(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PhaseObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn options(&self) -> &SubmitOptions {
        &self.options
    }

    /// Pre-check balance, sign, and relay
    ///
    /// Consumes the unsigned transaction; a failed attempt must be rebuilt.
    pub async fn submit(
        &self,
        unsigned: UnsignedTransaction,
        signer: &dyn WalletSigner,
        network: &dyn NetworkClient,
    ) -> Result<SubmissionReceipt, TransferError> {
        let ctx = unsigned.context_id.clone();
        let mut tracker = PhaseTracker::resume(&ctx, TransferPhase::Pending, self.observer.as_ref());

        // 1. Advisory balance pre-check
        if let Err(e) = self.check_balance(&unsigned, network).await {
            tracker.apply(TransferEvent::Rejected, Some(e.to_string()));
            return Err(e);
        }

        // 2. Wallet authorization (unbounded wait)
        tracker.apply(TransferEvent::SignRequested, None);
        log::info!("[{}] awaiting signature from {}", ctx, signer.name());

        let signed = match signer.sign_transaction(&unsigned).await {
            Ok(signed) => signed,
            Err(e) => {
                let err = match e {
                    SignerError::UserRejected => TransferError::UserRejected,
                    SignerError::Unavailable(reason) => TransferError::SignerUnavailable(reason),
                };
                log::warn!("[{}] signing failed: {}", ctx, err);
                tracker.apply(TransferEvent::Rejected, Some(err.to_string()));
                return Err(err);
            }
        };
        tracker.apply(TransferEvent::Signed, None);

        // 3. Relay
        let send_opts = SendOptions {
            skip_preflight: self.options.skip_preflight,
            preflight_commitment: self.options.preflight_commitment,
            max_retries: self.options.max_retries,
        };

        let local_id = signed.id();

        let id = match (network.send_transaction(&signed, &send_opts).await, local_id) {
            (Ok(id), local_id) => {
                if let Some(local_id) = local_id.filter(|l| *l != id) {
                    log::debug!("[{}] node id {} differs from local signature {}", ctx, id, local_id);
                }
                log::info!("[{}] transfer relayed: {}", ctx, id);
                id
            }
            // The node may hold the transaction; hand back the signature so
            // the caller verifies instead of paying again.
            (Err(e), Some(local_id)) if e.delivery_uncertain() => {
                log::warn!(
                    "[{}] relay outcome unknown ({}), tracking local signature {}",
                    ctx,
                    e,
                    local_id
                );
                local_id
            }
            (Err(e), _) => {
                let err = map_send_error(e);
                log::error!("[{}] relay failed: {}", ctx, err);
                tracker.apply(TransferEvent::Rejected, Some(err.to_string()));
                return Err(err);
            }
        };

        Ok(SubmissionReceipt {
            id,
            blockhash: unsigned.freshness.blockhash,
            last_valid_block_height: unsigned.freshness.last_valid_block_height,
            payee: unsigned.payee,
            lamports: unsigned.lamports,
            context_id: unsigned.context_id,
        })
    }

    /// Fails fast on a known shortfall; a failed balance read is not fatal
    async fn check_balance(
        &self,
        unsigned: &UnsignedTransaction,
        network: &dyn NetworkClient,
    ) -> Result<(), TransferError> {
        let required = unsigned.lamports.saturating_add(self.options.estimated_fee);

        match network.get_balance(&unsigned.payer).await {
            Ok(available) if available < required => {
                log::warn!(
                    "[{}] payer {} holds {} base units, needs {}",
                    unsigned.context_id,
                    unsigned.payer,
                    available,
                    required
                );
                Err(TransferError::InsufficientFunds {
                    available,
                    required,
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                log::warn!(
                    "[{}] balance pre-check skipped: {}",
                    unsigned.context_id,
                    e
                );
                Ok(())
            }
        }
    }
}

fn map_send_error(err: NetworkError) -> TransferError {
    if err.is_balance_related() {
        TransferError::InsufficientFundsAtSubmission(err.to_string())
    } else if err.is_rejection() {
        TransferError::SubmissionRejected(err.to_string())
    } else {
        TransferError::NetworkUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::adapters::mock::SignBehavior;
    use crate::transfer::adapters::{MockNetwork, MockSigner};
    use crate::transfer::observer::RecordingObserver;
    use crate::transfer::types::{Address, Freshness};

    fn unsigned(lamports: u64) -> UnsignedTransaction {
        UnsignedTransaction {
            payer: Address::new("4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi"),
            payee: Address::new("8qbHbw2BbbTHBW1sbeqakYXVKRQM8Ne7pLK7m6CVfeR"),
            lamports,
            context_id: "sub-7".to_string(),
            freshness: Freshness {
                blockhash: "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N".to_string(),
                last_valid_block_height: 500,
            },
            message: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn test_submit_happy_path() {
        let network = MockNetwork::new();
        let signer = MockSigner::approving();
        let observer = Arc::new(RecordingObserver::new());
        let coordinator = SigningCoordinator::new(SubmitOptions::default())
            .with_observer(observer.clone());

        let receipt = coordinator
            .submit(unsigned(50_000_000), &signer, &network)
            .await
            .unwrap();

        assert_eq!(receipt.id, "sig123");
        assert_eq!(receipt.last_valid_block_height, 500);
        assert_eq!(receipt.lamports, 50_000_000);
        assert_eq!(receipt.context_id, "sub-7");
        assert_eq!(
            observer.phases(),
            vec![TransferPhase::Signing, TransferPhase::Sending]
        );

        let sent = network.sent();
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].1.skip_preflight);
        assert_eq!(sent[0].1.max_retries, 3);
        assert_eq!(sent[0].0.message, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_user_rejection() {
        let network = MockNetwork::new();
        let signer = MockSigner::new(SignBehavior::Reject);
        let observer = Arc::new(RecordingObserver::new());
        let coordinator = SigningCoordinator::new(SubmitOptions::default())
            .with_observer(observer.clone());

        let err = coordinator
            .submit(unsigned(1_000), &signer, &network)
            .await
            .unwrap_err();

        assert_eq!(err, TransferError::UserRejected);
        assert_eq!(network.call_count("send_transaction"), 0);
        assert_eq!(
            observer.phases(),
            vec![TransferPhase::Signing, TransferPhase::Failed]
        );
    }

    #[tokio::test]
    async fn test_signer_unavailable() {
        let network = MockNetwork::new();
        let signer = MockSigner::new(SignBehavior::Unavailable("wallet locked".to_string()));
        let coordinator = SigningCoordinator::new(SubmitOptions::default());

        let err = coordinator
            .submit(unsigned(1_000), &signer, &network)
            .await
            .unwrap_err();
        assert_eq!(err, TransferError::SignerUnavailable("wallet locked".to_string()));
    }

    #[tokio::test]
    async fn test_insufficient_funds_skips_signer() {
        let network = MockNetwork::new();
        network.set_balance(Ok(50_004_999)); // one short of amount + fee
        let signer = MockSigner::approving();
        let coordinator = SigningCoordinator::new(SubmitOptions::default());

        let err = coordinator
            .submit(unsigned(50_000_000), &signer, &network)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TransferError::InsufficientFunds {
                available: 50_004_999,
                required: 50_005_000
            }
        );
        assert_eq!(signer.call_count(), 0);
        assert_eq!(network.call_count("send_transaction"), 0);
    }

    #[tokio::test]
    async fn test_exact_balance_passes_precheck() {
        let network = MockNetwork::new();
        network.set_balance(Ok(50_005_000));
        let signer = MockSigner::approving();
        let coordinator = SigningCoordinator::new(SubmitOptions::default());

        assert!(coordinator
            .submit(unsigned(50_000_000), &signer, &network)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_balance_query_failure_proceeds_to_signing() {
        let network = MockNetwork::new();
        network.set_balance(Err(NetworkError::Unavailable("503".to_string())));
        let signer = MockSigner::approving();
        let coordinator = SigningCoordinator::new(SubmitOptions::default());

        let receipt = coordinator
            .submit(unsigned(1_000), &signer, &network)
            .await
            .unwrap();
        assert_eq!(receipt.id, "sig123");
        assert_eq!(signer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_balance_rejection_at_submission() {
        let network = MockNetwork::new();
        network.set_send_result(Err(NetworkError::Rpc {
            code: -32002,
            message: "Transaction simulation failed: Attempt to debit an account but found no record of a prior credit.".to_string(),
        }));
        let signer = MockSigner::approving();
        let observer = Arc::new(RecordingObserver::new());
        let coordinator = SigningCoordinator::new(SubmitOptions::default())
            .with_observer(observer.clone());

        let err = coordinator
            .submit(unsigned(1_000), &signer, &network)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::InsufficientFundsAtSubmission(_)));
        assert_eq!(
            observer.phases(),
            vec![
                TransferPhase::Signing,
                TransferPhase::Sending,
                TransferPhase::Failed
            ]
        );
    }

    #[tokio::test]
    async fn test_other_rejection_keeps_raw_reason() {
        let network = MockNetwork::new();
        network.set_send_result(Err(NetworkError::Rpc {
            code: -32002,
            message: "Blockhash not found".to_string(),
        }));
        let signer = MockSigner::approving();
        let coordinator = SigningCoordinator::new(SubmitOptions::default());

        let err = coordinator
            .submit(unsigned(1_000), &signer, &network)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::SubmissionRejected(ref m) if m.contains("Blockhash not found")));
    }

    #[tokio::test]
    async fn test_relay_timeout_returns_local_signature() {
        let network = MockNetwork::new();
        network.set_send_result(Err(NetworkError::Timeout("30s".to_string())));
        let signer = MockSigner::approving();
        let observer = Arc::new(RecordingObserver::new());
        let coordinator = SigningCoordinator::new(SubmitOptions::default())
            .with_observer(observer.clone());

        let receipt = coordinator
            .submit(unsigned(1_000), &signer, &network)
            .await
            .unwrap();

        // base58 of the mock signer's [7; 64] signature
        assert_eq!(
            receipt.id,
            "99eUso3aSbE9tqGSTXzo3TLfKb9RkMTURrHKQ1K7Zh3BbeqPevr5E1iCbpTjqHuTFLtfxTTD5ekfVuZFzQyEQf8"
        );
        assert_eq!(receipt.last_valid_block_height, 500);
        assert!(!observer.phases().contains(&TransferPhase::Failed));
    }

    #[tokio::test]
    async fn test_dropped_connection_returns_local_signature() {
        let network = MockNetwork::new();
        network.set_send_result(Err(NetworkError::Interrupted("connection reset".to_string())));
        let signer = MockSigner::approving();
        let coordinator = SigningCoordinator::new(SubmitOptions::default());

        let receipt = coordinator
            .submit(unsigned(1_000), &signer, &network)
            .await
            .unwrap();
        assert_eq!(receipt.context_id, "sub-7");
        assert_ne!(receipt.id, "sig123");
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_unavailable() {
        let network = MockNetwork::new();
        network.set_send_result(Err(NetworkError::Unavailable("connection refused".to_string())));
        let signer = MockSigner::approving();
        let coordinator = SigningCoordinator::new(SubmitOptions::default());

        let err = coordinator
            .submit(unsigned(1_000), &signer, &network)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::NetworkUnavailable(_)));
    }
}
