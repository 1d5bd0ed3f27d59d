//! Confirmation Verifier
//!
//! Decides what happened to a relayed transfer. The cascade is:
//! bounded confirmation wait, repeated full-record lookup, then a
//! signature-status fallback. Verification only reads from the network,
//! so calling it again for the same receipt is always safe.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::transfer::adapters::NetworkClient;
use crate::transfer::errors::NetworkError;
use crate::transfer::observer::{self, PhaseObserver, PhaseTracker};
use crate::transfer::state::{TransferEvent, TransferPhase};
use crate::transfer::types::{Commitment, SubmissionReceipt, TransactionRecord, TransferOutcome};

/// Retry and timeout settings for the cascade
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Upper bound on the confirmation wait
    pub confirm_timeout: Duration,
    /// Full-record lookups before falling back to signature status
    pub lookup_attempts: u32,
    /// Pause between lookups
    pub lookup_delay: Duration,
    pub commitment: Commitment,
    /// Allowed gap between observed payee delta and expected amount (base units)
    pub amount_tolerance: u64,
    /// Treat a delta mismatch as unverifiable instead of logging it
    pub strict_amount_check: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(60),
            lookup_attempts: 5,
            lookup_delay: Duration::from_secs(2),
            commitment: Commitment::Confirmed,
            amount_tolerance: 0,
            strict_amount_check: false,
        }
    }
}

/// Delay source for the lookup loop
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and remembers each requested delay
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}

pub struct ConfirmationVerifier {
    config: VerifierConfig,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn PhaseObserver>,
}

impl ConfirmationVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            sleeper: Arc::new(TokioSleeper),
            observer: observer::noop(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PhaseObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Run the verification cascade for `receipt`
    ///
    /// Never fails: every path ends in a `TransferOutcome`.
    pub async fn verify(
        &self,
        receipt: &SubmissionReceipt,
        network: &dyn NetworkClient,
    ) -> TransferOutcome {
        let ctx = receipt.context_id.as_str();
        let mut tracker = PhaseTracker::resume(ctx, TransferPhase::Sending, self.observer.as_ref());
        tracker.apply(TransferEvent::Submitted, Some(receipt.id.clone()));

        let outcome = self.run_cascade(receipt, network).await;

        match &outcome {
            TransferOutcome::Confirmed(r) => {
                log::info!("[{}] transfer {} confirmed", ctx, r.id);
                tracker.apply(TransferEvent::Verified, Some(r.id.clone()));
            }
            TransferOutcome::Failed { reason } => {
                log::warn!("[{}] transfer {} failed: {}", ctx, receipt.id, reason);
                tracker.apply(TransferEvent::Rejected, Some(reason.clone()));
            }
            TransferOutcome::Unverifiable { last_error, .. } => {
                log::warn!(
                    "[{}] transfer {} unverifiable, manual check needed: {}",
                    ctx,
                    receipt.id,
                    last_error
                );
                tracker.apply(TransferEvent::Inconclusive, Some(last_error.clone()));
            }
        }

        outcome
    }

    async fn run_cascade(
        &self,
        receipt: &SubmissionReceipt,
        network: &dyn NetworkClient,
    ) -> TransferOutcome {
        let ctx = receipt.context_id.as_str();
        let mut last_error = String::from("no lookup attempted");
        let mut expired = false;

        // 1. Bounded confirmation wait; any result moves on to the lookups
        match tokio::time::timeout(
            self.config.confirm_timeout,
            network.confirm_transaction(receipt, self.config.commitment),
        )
        .await
        {
            Ok(Ok(())) => {
                log::debug!("[{}] {} reached {}", ctx, receipt.id, self.config.commitment);
            }
            Ok(Err(e @ NetworkError::BlockHeightExceeded { .. })) => {
                log::warn!("[{}] {}: {}", ctx, receipt.id, e);
                expired = true;
                last_error = e.to_string();
            }
            Ok(Err(e)) => {
                log::warn!("[{}] confirmation wait failed: {}", ctx, e);
                last_error = e.to_string();
            }
            Err(_) => {
                log::warn!(
                    "[{}] confirmation wait timed out after {:?}",
                    ctx,
                    self.config.confirm_timeout
                );
                last_error = format!(
                    "confirmation timed out after {:?}",
                    self.config.confirm_timeout
                );
            }
        }

        // 2. Full record lookup with fixed delay
        let attempts = self.config.lookup_attempts.max(1);
        for attempt in 1..=attempts {
            match network.get_transaction(&receipt.id).await {
                Ok(Some(record)) => {
                    if let Some(err) = record.err.as_ref() {
                        return TransferOutcome::Failed {
                            reason: err.clone(),
                        };
                    }
                    return self.check_amount(receipt, &record);
                }
                Ok(None) => {
                    log::debug!(
                        "[{}] {} not found (attempt {}/{})",
                        ctx,
                        receipt.id,
                        attempt,
                        attempts
                    );
                    last_error = format!("transaction {} not found", receipt.id);
                }
                Err(e) => {
                    log::warn!(
                        "[{}] lookup failed (attempt {}/{}): {}",
                        ctx,
                        attempt,
                        attempts,
                        e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                self.sleeper.sleep(self.config.lookup_delay).await;
            }
        }

        // 3. Signature status fallback
        match network.get_signature_status(&receipt.id).await {
            Ok(Some(status)) => match status.err {
                Some(err) => TransferOutcome::Failed { reason: err },
                None => {
                    log::info!(
                        "[{}] {} known to the network at slot {} ({:?})",
                        ctx,
                        receipt.id,
                        status.slot,
                        status.confirmation_status
                    );
                    TransferOutcome::Confirmed(receipt.clone())
                }
            },
            Ok(None) if expired => TransferOutcome::Failed {
                reason: "expired".to_string(),
            },
            Ok(None) => TransferOutcome::Unverifiable {
                receipt: receipt.clone(),
                last_error,
            },
            Err(e) => {
                log::warn!("[{}] status lookup failed: {}", ctx, e);
                TransferOutcome::Unverifiable {
                    receipt: receipt.clone(),
                    last_error: e.to_string(),
                }
            }
        }
    }

    /// Cross-check the payee's balance change against the submitted amount
    fn check_amount(&self, receipt: &SubmissionReceipt, record: &TransactionRecord) -> TransferOutcome {
        let expected = receipt.lamports as i128;
        let mismatch = match record.balance_delta(&receipt.payee) {
            Some(delta) if (delta - expected).unsigned_abs() <= self.config.amount_tolerance as u128 => {
                return TransferOutcome::Confirmed(receipt.clone());
            }
            Some(delta) => format!(
                "payee {} received {} base units, expected {}",
                receipt.payee, delta, expected
            ),
            None => format!(
                "payee {} missing from balance snapshots",
                receipt.payee
            ),
        };

        log::warn!("[{}] amount check: {}", receipt.context_id, mismatch);

        if self.config.strict_amount_check {
            TransferOutcome::Unverifiable {
                receipt: receipt.clone(),
                last_error: mismatch,
            }
        } else {
            TransferOutcome::Confirmed(receipt.clone())
        }
    }
}
