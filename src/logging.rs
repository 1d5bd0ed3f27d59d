/// Structured transfer logging
///
/// JSON log lines for the events an operator greps for after the fact:
/// a relay with its receipt id, and the verified outcome.

use serde_json::{json, Value};

/// Current timestamp in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Structured log event builder
///
/// Usage:
/// ```
/// use reward_transfer::logging::LogEvent;
///
/// let log_value = LogEvent::new("TRANSFER_SUBMITTED")
///     .field("context_id", "sub-42")
///     .field("receipt_id", "sig123")
///     .field("lamports", 50_000_000u64)
///     .build();
///
/// log::info!("{}", log_value);
/// ```
pub struct LogEvent {
    fields: serde_json::Map<String, Value>,
}

impl LogEvent {
    pub fn new(event: &str) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("event".to_string(), json!(event));
        fields.insert("timestamp_ms".to_string(), json!(now_ms()));

        Self { fields }
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Add a field only when the value is present
    pub fn maybe_field(self, key: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.field(key, v),
            None => self,
        }
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}

#[macro_export]
macro_rules! log_transfer_submitted {
    ($receipt:expr) => {
        log::info!(
            "{}",
            $crate::logging::LogEvent::new("TRANSFER_SUBMITTED")
                .field("context_id", $receipt.context_id.as_str())
                .field("receipt_id", $receipt.id.as_str())
                .field("payee", $receipt.payee.as_str())
                .field("lamports", $receipt.lamports)
                .field("last_valid_block_height", $receipt.last_valid_block_height)
                .build()
        );
    };
}

#[macro_export]
macro_rules! log_transfer_outcome {
    ($context_id:expr, $outcome:expr) => {{
        let outcome: &$crate::transfer::types::TransferOutcome = $outcome;
        let (status, detail) = match outcome {
            $crate::transfer::types::TransferOutcome::Confirmed(_) => ("confirmed", None),
            $crate::transfer::types::TransferOutcome::Failed { reason } => {
                ("failed", Some(reason.as_str()))
            }
            $crate::transfer::types::TransferOutcome::Unverifiable { last_error, .. } => {
                ("unverifiable", Some(last_error.as_str()))
            }
        };
        log::info!(
            "{}",
            $crate::logging::LogEvent::new("TRANSFER_OUTCOME")
                .field("context_id", $context_id)
                .field("status", status)
                .maybe_field("receipt_id", outcome.receipt().map(|r| r.id.as_str()))
                .maybe_field("detail", detail)
                .build()
        );
    }};
}
