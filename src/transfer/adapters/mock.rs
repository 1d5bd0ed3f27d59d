//! Mock adapters for testing
//!
//! Allows scripting results for each network call and counting invocations.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::traits::{NetworkClient, WalletSigner};
use crate::transfer::errors::{NetworkError, SignerError};
use crate::transfer::record::{RecordStatus, RecordStore, RecordUpdate, StoredRecord};
use crate::transfer::types::{
    Address, Commitment, Freshness, SendOptions, SignatureStatus, SignedTransaction,
    SubmissionReceipt, TransactionRecord, UnsignedTransaction,
};

/// How `confirm_transaction` behaves
#[derive(Debug, Clone)]
pub enum ConfirmBehavior {
    /// Resolve immediately
    Confirmed,
    /// Never resolve (forces the caller's timeout)
    Hang,
    /// Fail with the given error
    Fail(NetworkError),
}

/// Mock network node
pub struct MockNetwork {
    blockhash: Mutex<Result<Freshness, NetworkError>>,
    balance: Mutex<Result<u64, NetworkError>>,
    send_result: Mutex<Result<String, NetworkError>>,
    confirm: Mutex<ConfirmBehavior>,
    /// Results handed out per `get_transaction` call; the last one repeats
    transactions: Mutex<VecDeque<Result<Option<TransactionRecord>, NetworkError>>>,
    status: Mutex<Result<Option<SignatureStatus>, NetworkError>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    sent: Mutex<Vec<(SignedTransaction, SendOptions)>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self {
            blockhash: Mutex::new(Ok(Freshness {
                blockhash: "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N".to_string(),
                last_valid_block_height: 1_000,
            })),
            balance: Mutex::new(Ok(u64::MAX)),
            send_result: Mutex::new(Ok("sig123".to_string())),
            confirm: Mutex::new(ConfirmBehavior::Confirmed),
            transactions: Mutex::new(VecDeque::from(vec![Ok(None)])),
            status: Mutex::new(Ok(None)),
            calls: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_blockhash(&self, result: Result<Freshness, NetworkError>) {
        *self.blockhash.lock().unwrap() = result;
    }

    pub fn set_balance(&self, result: Result<u64, NetworkError>) {
        *self.balance.lock().unwrap() = result;
    }

    pub fn set_send_result(&self, result: Result<String, NetworkError>) {
        *self.send_result.lock().unwrap() = result;
    }

    pub fn set_confirm(&self, behavior: ConfirmBehavior) {
        *self.confirm.lock().unwrap() = behavior;
    }

    /// Script successive `get_transaction` results
    pub fn set_transactions(&self, results: Vec<Result<Option<TransactionRecord>, NetworkError>>) {
        *self.transactions.lock().unwrap() = results.into();
    }

    pub fn set_status(&self, result: Result<Option<SignatureStatus>, NetworkError>) {
        *self.status.lock().unwrap() = result;
    }

    /// Number of calls made to `method`
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Transactions relayed so far
    pub fn sent(&self) -> Vec<(SignedTransaction, SendOptions)> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str) {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
    }
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkClient for MockNetwork {
    async fn get_latest_blockhash(&self) -> Result<Freshness, NetworkError> {
        self.record("get_latest_blockhash");
        self.blockhash.lock().unwrap().clone()
    }

    async fn get_balance(&self, address: &Address) -> Result<u64, NetworkError> {
        self.record("get_balance");
        log::debug!("[mock] get_balance({})", address);
        self.balance.lock().unwrap().clone()
    }

    async fn send_transaction(
        &self,
        tx: &SignedTransaction,
        opts: &SendOptions,
    ) -> Result<String, NetworkError> {
        self.record("send_transaction");
        self.sent.lock().unwrap().push((tx.clone(), opts.clone()));
        self.send_result.lock().unwrap().clone()
    }

    async fn confirm_transaction(
        &self,
        receipt: &SubmissionReceipt,
        level: Commitment,
    ) -> Result<(), NetworkError> {
        self.record("confirm_transaction");
        log::debug!("[mock] confirm_transaction({}, {})", receipt.id, level);
        let behavior = self.confirm.lock().unwrap().clone();
        match behavior {
            ConfirmBehavior::Confirmed => Ok(()),
            ConfirmBehavior::Hang => std::future::pending().await,
            ConfirmBehavior::Fail(e) => Err(e),
        }
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>, NetworkError> {
        self.record("get_transaction");
        log::debug!("[mock] get_transaction({})", id);
        let mut queue = self.transactions.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(Ok(None))
        } else {
            queue.front().cloned().unwrap_or(Ok(None))
        }
    }

    async fn get_signature_status(&self, id: &str) -> Result<Option<SignatureStatus>, NetworkError> {
        self.record("get_signature_status");
        log::debug!("[mock] get_signature_status({})", id);
        self.status.lock().unwrap().clone()
    }
}

/// How the mock wallet answers
#[derive(Debug, Clone)]
pub enum SignBehavior {
    Approve,
    Reject,
    Unavailable(String),
}

/// Mock wallet
pub struct MockSigner {
    behavior: Mutex<SignBehavior>,
    calls: Mutex<usize>,
}

impl MockSigner {
    pub fn new(behavior: SignBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            calls: Mutex::new(0),
        }
    }

    pub fn approving() -> Self {
        Self::new(SignBehavior::Approve)
    }

    pub fn set_behavior(&self, behavior: SignBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl WalletSigner for MockSigner {
    async fn sign_transaction(
        &self,
        unsigned: &UnsignedTransaction,
    ) -> Result<SignedTransaction, SignerError> {
        *self.calls.lock().unwrap() += 1;
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            SignBehavior::Approve => Ok(SignedTransaction {
                signatures: vec![[7u8; 64]],
                message: unsigned.message.clone(),
            }),
            SignBehavior::Reject => Err(SignerError::UserRejected),
            SignBehavior::Unavailable(reason) => Err(SignerError::Unavailable(reason)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// In-memory record journal
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, StoredRecord>>,
    history: Mutex<Vec<RecordUpdate>>,
    fail_writes: Mutex<bool>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every update applied, in order
    pub fn history(&self) -> Vec<RecordUpdate> {
        self.history.lock().unwrap().clone()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn apply(&self, update: &RecordUpdate) -> anyhow::Result<StoredRecord> {
        if *self.fail_writes.lock().unwrap() {
            anyhow::bail!("store is read-only");
        }
        let mut records = self.records.lock().unwrap();
        let record = StoredRecord::merge(records.remove(&update.context_id), update);
        records.insert(update.context_id.clone(), record.clone());
        self.history.lock().unwrap().push(update.clone());
        Ok(record)
    }

    async fn get(&self, context_id: &str) -> anyhow::Result<Option<StoredRecord>> {
        Ok(self.records.lock().unwrap().get(context_id).cloned())
    }

    async fn list_by_status(&self, status: RecordStatus) -> anyhow::Result<Vec<StoredRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }
}
