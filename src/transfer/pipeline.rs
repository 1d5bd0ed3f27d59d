//! Transfer Pipeline
//!
//! Runs build, submit and verify for one intent, keeps the record journal
//! in step, and refuses a second concurrent flow for the same context id.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::transfer::adapters::{NetworkClient, WalletSigner};
use crate::transfer::builder::TransferRequestBuilder;
use crate::transfer::coordinator::SigningCoordinator;
use crate::transfer::errors::TransferError;
use crate::transfer::observer::{self, PhaseObserver, PhaseUpdate};
use crate::transfer::record::{RecordStatus, RecordStore, RecordUpdate};
use crate::transfer::state::TransferPhase;
use crate::transfer::types::{SubmissionReceipt, TransferIntent, TransferOutcome};
use crate::transfer::verifier::ConfirmationVerifier;

/// Context ids with a flow in progress
#[derive(Default, Clone)]
struct InFlight {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    fn acquire(&self, context_id: &str) -> Result<InFlightGuard, TransferError> {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if !ids.insert(context_id.to_string()) {
            return Err(TransferError::AlreadyInFlight(context_id.to_string()));
        }
        Ok(InFlightGuard {
            ids: self.ids.clone(),
            context_id: context_id.to_string(),
        })
    }

    fn contains(&self, context_id: &str) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(context_id)
    }
}

/// Releases the context id when the flow ends, however it ends
struct InFlightGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    context_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.context_id);
    }
}

pub struct TransferPipeline {
    network: Arc<dyn NetworkClient>,
    signer: Arc<dyn WalletSigner>,
    coordinator: SigningCoordinator,
    verifier: ConfirmationVerifier,
    store: Option<Arc<dyn RecordStore>>,
    observer: Arc<dyn PhaseObserver>,
    in_flight: InFlight,
}

impl TransferPipeline {
    pub fn new(
        network: Arc<dyn NetworkClient>,
        signer: Arc<dyn WalletSigner>,
        coordinator: SigningCoordinator,
        verifier: ConfirmationVerifier,
    ) -> Self {
        Self {
            network,
            signer,
            coordinator,
            verifier,
            store: None,
            observer: observer::noop(),
            in_flight: InFlight::default(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Subscribe to phase changes of every flow run by this pipeline
    pub fn with_observer(mut self, observer: Arc<dyn PhaseObserver>) -> Self {
        self.coordinator = self.coordinator.with_observer(observer.clone());
        self.verifier = self.verifier.with_observer(observer.clone());
        self.observer = observer;
        self
    }

    pub fn is_in_flight(&self, context_id: &str) -> bool {
        self.in_flight.contains(context_id)
    }

    /// Pay out one reward end to end
    ///
    /// Errors cover everything up to and including relay. After relay the
    /// result is always an outcome. A context id the journal already holds a
    /// live receipt for is refused; use `resume` to check it instead.
    pub async fn run(&self, intent: &TransferIntent) -> Result<TransferOutcome, TransferError> {
        let _guard = self.in_flight.acquire(&intent.context_id)?;
        self.ensure_not_submitted(&intent.context_id).await?;

        self.notify(&intent.context_id, TransferPhase::Pending, None);

        let unsigned = match TransferRequestBuilder::build(intent, self.network.as_ref()).await {
            Ok(unsigned) => unsigned,
            Err(e) => {
                self.notify(&intent.context_id, TransferPhase::Failed, Some(e.to_string()));
                return Err(e);
            }
        };

        let receipt = self
            .coordinator
            .submit(unsigned, self.signer.as_ref(), self.network.as_ref())
            .await?;

        crate::log_transfer_submitted!(receipt);
        self.journal(&RecordUpdate::submitted(&receipt)).await;

        Ok(self.verify_and_record(&receipt).await)
    }

    /// Re-run verification for a journaled receipt
    pub async fn resume(&self, context_id: &str) -> Result<TransferOutcome, TransferError> {
        let _guard = self.in_flight.acquire(context_id)?;

        let store = self
            .store
            .as_ref()
            .ok_or_else(|| TransferError::RecordStore("no record store configured".to_string()))?;

        let record = store
            .get(context_id)
            .await
            .map_err(|e| TransferError::RecordStore(e.to_string()))?
            .ok_or_else(|| TransferError::RecordStore(format!("no record for {}", context_id)))?;

        let receipt = record.receipt.ok_or_else(|| {
            TransferError::RecordStore(format!("{} has no submitted receipt", context_id))
        })?;

        Ok(self.verify_and_record(&receipt).await)
    }

    /// Only a `Failed` record, or none at all, may be paid again
    async fn ensure_not_submitted(&self, context_id: &str) -> Result<(), TransferError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };
        let record = store
            .get(context_id)
            .await
            .map_err(|e| TransferError::RecordStore(format!("cannot read journal: {:#}", e)))?;

        match record {
            Some(record) if record.status != RecordStatus::Failed => match record.receipt_id() {
                Some(receipt_id) => {
                    log::warn!(
                        "[{}] already journaled as {} ({}), refusing to pay again",
                        context_id,
                        receipt_id,
                        record.status
                    );
                    Err(TransferError::AlreadySubmitted {
                        context_id: context_id.to_string(),
                        receipt_id: receipt_id.to_string(),
                    })
                }
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    async fn verify_and_record(&self, receipt: &SubmissionReceipt) -> TransferOutcome {
        let outcome = self.verifier.verify(receipt, self.network.as_ref()).await;
        crate::log_transfer_outcome!(receipt.context_id.as_str(), &outcome);
        self.journal(&RecordUpdate::from_outcome(&receipt.context_id, &outcome))
            .await;
        outcome
    }

    /// Store failures never change the outcome; the receipt is logged so the
    /// record can be repaired by hand.
    async fn journal(&self, update: &RecordUpdate) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.apply(update).await {
            log::error!(
                "[{}] failed to record status {} (receipt {:?}): {:#}",
                update.context_id,
                update.status,
                update.receipt.as_ref().map(|r| r.id.as_str()),
                e
            );
        }
    }

    fn notify(&self, context_id: &str, phase: TransferPhase, detail: Option<String>) {
        self.observer.on_phase(&PhaseUpdate {
            context_id: context_id.to_string(),
            phase,
            detail,
        });
    }
}
