//! JSON-RPC network client
//!
//! Talks to a node over HTTP JSON-RPC 2.0. Each trait call maps to a single
//! request except `confirm_transaction`, which polls until the requested
//! commitment is reached or the blockhash expires.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::traits::NetworkClient;
use crate::transfer::errors::NetworkError;
use crate::transfer::types::{
    Address, Commitment, Freshness, SendOptions, SignatureStatus, SignedTransaction,
    SubmissionReceipt, TransactionRecord,
};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignatureStatus {
    slot: u64,
    confirmations: Option<u64>,
    #[serde(default)]
    err: Option<Value>,
    confirmation_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    slot: u64,
    meta: Option<RawMeta>,
    transaction: RawTransactionBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMeta {
    #[serde(default)]
    err: Option<Value>,
    fee: u64,
    pre_balances: Vec<u64>,
    post_balances: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct RawTransactionBody {
    message: RawMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    account_keys: Vec<String>,
}

/// Unwrap a JSON-RPC envelope into its typed result
///
/// A `null` result is handed to `T`, so `Option<_>` results decode to `None`.
fn decode_response<T: DeserializeOwned>(body: Value) -> Result<T, NetworkError> {
    let response: JsonRpcResponse =
        serde_json::from_value(body).map_err(|e| NetworkError::Decode(e.to_string()))?;

    if let Some(err) = response.error {
        let message = match err.data.as_ref().and_then(|d| d.get("err")) {
            Some(inner) if !inner.is_null() => format!("{} ({})", err.message, inner),
            _ => err.message,
        };
        return Err(NetworkError::Rpc {
            code: err.code,
            message,
        });
    }

    serde_json::from_value(response.result.unwrap_or(Value::Null))
        .map_err(|e| NetworkError::Decode(e.to_string()))
}

/// Render an on-chain error value as text (`"InsufficientFundsForRent"`,
/// `{"InstructionError":[0,{"Custom":1}]}`)
fn error_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// What one confirm poll round decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfirmStep {
    Done,
    Expired,
    Continue,
}

/// Landing wins over expiry: a transaction seen at the requested level is
/// done even if the block height has since moved past its blockhash.
fn confirm_step(
    status: Option<&SignatureStatus>,
    block_height: Option<u64>,
    level: Commitment,
    last_valid_block_height: u64,
) -> ConfirmStep {
    if let Some(status) = status {
        // a failed execution still lands; the lookup reports the error
        if status.err.is_some() || status.confirmation_status.is_some_and(|c| c >= level) {
            return ConfirmStep::Done;
        }
    }
    match block_height {
        Some(height) if height > last_valid_block_height => ConfirmStep::Expired,
        _ => ConfirmStep::Continue,
    }
}

impl From<RawSignatureStatus> for SignatureStatus {
    fn from(raw: RawSignatureStatus) -> Self {
        SignatureStatus {
            slot: raw.slot,
            confirmations: raw.confirmations,
            err: raw.err.and_then(error_text),
            confirmation_status: raw
                .confirmation_status
                .and_then(|s| Commitment::from_str(&s).ok()),
        }
    }
}

impl From<RawTransaction> for TransactionRecord {
    fn from(raw: RawTransaction) -> Self {
        let account_keys = raw
            .transaction
            .message
            .account_keys
            .into_iter()
            .map(Address::new)
            .collect();

        match raw.meta {
            Some(meta) => TransactionRecord {
                slot: raw.slot,
                err: meta.err.and_then(error_text),
                fee: meta.fee,
                account_keys,
                pre_balances: meta.pre_balances,
                post_balances: meta.post_balances,
            },
            None => TransactionRecord {
                slot: raw.slot,
                account_keys,
                ..Default::default()
            },
        }
    }
}

/// HTTP JSON-RPC implementation of `NetworkClient`
pub struct RpcNetworkClient {
    http_client: reqwest::Client,
    rpc_url: String,
    request_id: AtomicU64,
    /// Commitment used for reads
    commitment: Commitment,
    /// Delay between polls inside `confirm_transaction`
    poll_interval: Duration,
}

impl RpcNetworkClient {
    pub fn new(rpc_url: impl Into<String>, commitment: Commitment) -> Result<Self, NetworkError> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.into(),
            request_id: AtomicU64::new(1),
            commitment,
            poll_interval: Duration::from_secs(1),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, NetworkError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        log::debug!("[rpc] >>> {} #{}", method, request.id);

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(NetworkError::Unavailable(format!("{} returned HTTP {}", method, status)));
        }

        let body: Value = response.json().await?;
        decode_response(body)
    }

    /// Current block height at the client's read commitment
    pub async fn get_block_height(&self) -> Result<u64, NetworkError> {
        self.call("getBlockHeight", json!([{ "commitment": self.commitment }]))
            .await
    }
}

#[async_trait]
impl NetworkClient for RpcNetworkClient {
    async fn get_latest_blockhash(&self) -> Result<Freshness, NetworkError> {
        let raw: WithContext<RawBlockhash> = self
            .call("getLatestBlockhash", json!([{ "commitment": self.commitment }]))
            .await?;

        Ok(Freshness {
            blockhash: raw.value.blockhash,
            last_valid_block_height: raw.value.last_valid_block_height,
        })
    }

    async fn get_balance(&self, address: &Address) -> Result<u64, NetworkError> {
        let raw: WithContext<u64> = self
            .call(
                "getBalance",
                json!([address.as_str(), { "commitment": self.commitment }]),
            )
            .await?;
        Ok(raw.value)
    }

    async fn send_transaction(
        &self,
        tx: &SignedTransaction,
        opts: &SendOptions,
    ) -> Result<String, NetworkError> {
        let encoded = BASE64.encode(tx.serialize());
        self.call(
            "sendTransaction",
            json!([
                encoded,
                {
                    "encoding": "base64",
                    "skipPreflight": opts.skip_preflight,
                    "preflightCommitment": opts.preflight_commitment,
                    "maxRetries": opts.max_retries,
                }
            ]),
        )
        .await
    }

    async fn confirm_transaction(
        &self,
        receipt: &SubmissionReceipt,
        level: Commitment,
    ) -> Result<(), NetworkError> {
        loop {
            let status = self
                .get_signature_status(&receipt.id)
                .await
                .unwrap_or_else(|e| {
                    log::debug!("[rpc] status poll for {} failed: {}", receipt.id, e);
                    None
                });

            let step = confirm_step(status.as_ref(), None, level, receipt.last_valid_block_height);
            if step == ConfirmStep::Done {
                return Ok(());
            }

            let height = self
                .get_block_height()
                .await
                .map_err(|e| log::debug!("[rpc] block height poll failed: {}", e))
                .ok();

            match confirm_step(status.as_ref(), height, level, receipt.last_valid_block_height) {
                ConfirmStep::Done => return Ok(()),
                ConfirmStep::Expired => {
                    return Err(NetworkError::BlockHeightExceeded {
                        last_valid_block_height: receipt.last_valid_block_height,
                    });
                }
                ConfirmStep::Continue => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>, NetworkError> {
        // getTransaction does not serve the processed level
        let commitment = self.commitment.max(Commitment::Confirmed);
        let raw: Option<RawTransaction> = self
            .call(
                "getTransaction",
                json!([
                    id,
                    {
                        "encoding": "json",
                        "commitment": commitment,
                        "maxSupportedTransactionVersion": 0,
                    }
                ]),
            )
            .await?;
        Ok(raw.map(TransactionRecord::from))
    }

    async fn get_signature_status(&self, id: &str) -> Result<Option<SignatureStatus>, NetworkError> {
        let raw: WithContext<Vec<Option<RawSignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[id], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(raw
            .value
            .into_iter()
            .next()
            .flatten()
            .map(SignatureStatus::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_latest_blockhash() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "context": { "slot": 2792 },
                "value": {
                    "blockhash": "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N",
                    "lastValidBlockHeight": 3090
                }
            }
        });
        let raw: WithContext<RawBlockhash> = decode_response(body).unwrap();
        assert_eq!(raw.value.blockhash, "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N");
        assert_eq!(raw.value.last_valid_block_height, 3090);
    }

    #[test]
    fn test_decode_rpc_error_keeps_code_and_inner_err() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {
                "code": -32002,
                "message": "Transaction simulation failed: Error processing Instruction 0: custom program error: 0x1",
                "data": { "err": { "InstructionError": [0, { "Custom": 1 }] }, "logs": [] }
            }
        });
        let err = decode_response::<String>(body).unwrap_err();
        match &err {
            NetworkError::Rpc { code, message } => {
                assert_eq!(*code, -32002);
                assert!(message.contains("InstructionError"));
            }
            other => panic!("expected rpc error, got {:?}", other),
        }
        assert!(err.is_balance_related());
    }

    #[test]
    fn test_confirm_step_decisions() {
        fn status(level: Option<Commitment>, err: Option<&str>) -> SignatureStatus {
            SignatureStatus {
                slot: 9,
                confirmations: None,
                err: err.map(str::to_string),
                confirmation_status: level,
            }
        }
        let processed = status(Some(Commitment::Processed), None);
        let confirmed = status(Some(Commitment::Confirmed), None);
        let finalized = status(Some(Commitment::Finalized), None);
        let unlabeled = status(None, None);
        let failed = status(Some(Commitment::Processed), Some("InstructionError"));

        let cases: Vec<(Option<&SignatureStatus>, Option<u64>, Commitment, ConfirmStep)> = vec![
            // not seen, blockhash still valid or height unknown
            (None, None, Commitment::Confirmed, ConfirmStep::Continue),
            (None, Some(499), Commitment::Confirmed, ConfirmStep::Continue),
            (None, Some(500), Commitment::Confirmed, ConfirmStep::Continue),
            // past the last valid height
            (None, Some(501), Commitment::Confirmed, ConfirmStep::Expired),
            (Some(&processed), Some(501), Commitment::Confirmed, ConfirmStep::Expired),
            // below the requested level keeps polling
            (Some(&processed), Some(400), Commitment::Confirmed, ConfirmStep::Continue),
            (Some(&unlabeled), Some(400), Commitment::Processed, ConfirmStep::Continue),
            (Some(&confirmed), None, Commitment::Finalized, ConfirmStep::Continue),
            // at or above the level is done, even after expiry
            (Some(&confirmed), None, Commitment::Confirmed, ConfirmStep::Done),
            (Some(&finalized), Some(400), Commitment::Confirmed, ConfirmStep::Done),
            (Some(&processed), None, Commitment::Processed, ConfirmStep::Done),
            (Some(&confirmed), Some(900), Commitment::Confirmed, ConfirmStep::Done),
            // an execution error has landed
            (Some(&failed), None, Commitment::Finalized, ConfirmStep::Done),
            (Some(&failed), Some(900), Commitment::Finalized, ConfirmStep::Done),
        ];

        for (i, (status, height, level, expected)) in cases.into_iter().enumerate() {
            assert_eq!(
                confirm_step(status, height, level, 500),
                expected,
                "case {}",
                i
            );
        }
    }

    #[test]
    fn test_decode_null_transaction_is_none() {
        let body = json!({ "jsonrpc": "2.0", "id": 4, "result": null });
        let raw: Option<RawTransaction> = decode_response(body).unwrap();
        assert!(raw.is_none());
    }

    #[test]
    fn test_decode_transaction_record() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 5,
            "result": {
                "slot": 430,
                "blockTime": 1700000000,
                "meta": {
                    "err": null,
                    "fee": 5000,
                    "preBalances": [2000000000, 10, 1],
                    "postBalances": [1949995000, 50000010, 1],
                    "status": { "Ok": null }
                },
                "transaction": {
                    "message": {
                        "accountKeys": [
                            "4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi",
                            "8qbHbw2BbbTHBW1sbeqakYXVKRQM8Ne7pLK7m6CVfeR",
                            "11111111111111111111111111111111"
                        ],
                        "header": {
                            "numRequiredSignatures": 1,
                            "numReadonlySignedAccounts": 0,
                            "numReadonlyUnsignedAccounts": 1
                        }
                    },
                    "signatures": ["sig123"]
                }
            }
        });
        let raw: Option<RawTransaction> = decode_response(body).unwrap();
        let record = TransactionRecord::from(raw.unwrap());

        assert_eq!(record.slot, 430);
        assert!(record.err.is_none());
        assert_eq!(record.fee, 5_000);
        let payee = Address::new("8qbHbw2BbbTHBW1sbeqakYXVKRQM8Ne7pLK7m6CVfeR");
        assert_eq!(record.balance_delta(&payee), Some(50_000_000));
    }

    #[test]
    fn test_decode_failed_transaction_error_text() {
        let body = json!({
            "result": {
                "slot": 431,
                "meta": {
                    "err": { "InstructionError": [0, { "Custom": 1 }] },
                    "fee": 5000,
                    "preBalances": [10000],
                    "postBalances": [5000]
                },
                "transaction": { "message": { "accountKeys": ["A"] } }
            }
        });
        let raw: Option<RawTransaction> = decode_response(body).unwrap();
        let record = TransactionRecord::from(raw.unwrap());
        assert_eq!(
            record.err.as_deref(),
            Some(r#"{"InstructionError":[0,{"Custom":1}]}"#)
        );
    }

    #[test]
    fn test_decode_signature_statuses() {
        let body = json!({
            "result": {
                "context": { "slot": 82 },
                "value": [
                    { "slot": 72, "confirmations": 10, "err": null, "confirmationStatus": "confirmed" }
                ]
            }
        });
        let raw: WithContext<Vec<Option<RawSignatureStatus>>> = decode_response(body).unwrap();
        let status = raw.value.into_iter().next().flatten().map(SignatureStatus::from).unwrap();
        assert_eq!(status.slot, 72);
        assert_eq!(status.confirmations, Some(10));
        assert!(status.err.is_none());
        assert_eq!(status.confirmation_status, Some(Commitment::Confirmed));

        let body = json!({ "result": { "context": { "slot": 82 }, "value": [null] } });
        let raw: WithContext<Vec<Option<RawSignatureStatus>>> = decode_response(body).unwrap();
        assert!(raw.value.into_iter().next().flatten().is_none());
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let body = json!({ "result": "not-a-number" });
        assert!(matches!(decode_response::<u64>(body), Err(NetworkError::Decode(_))));
    }

    #[test]
    fn test_send_params_serialize_commitment_lowercase() {
        let params = json!({ "preflightCommitment": Commitment::Confirmed });
        assert_eq!(params["preflightCommitment"], "confirmed");
    }
}
