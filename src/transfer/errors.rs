// Error types for reward transfers
use std::fmt;

/// Failures raised by the build and submit stages
///
/// Verification never raises; it returns a `TransferOutcome` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // Caller errors
    InvalidIntent(String),

    // Network errors
    NetworkUnavailable(String),

    // Signer errors
    UserRejected,
    SignerUnavailable(String),

    // Balance errors
    InsufficientFunds { available: u64, required: u64 },
    InsufficientFundsAtSubmission(String),

    // Node rejected the relay
    SubmissionRejected(String),

    // Caller-side plumbing
    AlreadyInFlight(String),
    /// A receipt for this context id is already journaled
    AlreadySubmitted { context_id: String, receipt_id: String },
    RecordStore(String),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIntent(msg) => write!(f, "Invalid transfer intent: {}", msg),
            Self::NetworkUnavailable(msg) => write!(f, "Network unavailable: {}", msg),
            Self::UserRejected => write!(f, "Signing request was rejected in the wallet"),
            Self::SignerUnavailable(msg) => write!(f, "Signer unavailable: {}", msg),
            Self::InsufficientFunds { available, required } => write!(
                f,
                "Insufficient funds: have {} base units, need {}",
                available, required
            ),
            Self::InsufficientFundsAtSubmission(msg) => {
                write!(f, "Insufficient funds at submission: {}", msg)
            }
            Self::SubmissionRejected(msg) => write!(f, "Transaction rejected: {}", msg),
            Self::AlreadyInFlight(ctx) => {
                write!(f, "A transfer for {} is already in progress", ctx)
            }
            Self::AlreadySubmitted {
                context_id,
                receipt_id,
            } => write!(
                f,
                "A transfer for {} was already submitted as {}",
                context_id, receipt_id
            ),
            Self::RecordStore(msg) => write!(f, "Record store error: {}", msg),
        }
    }
}

impl std::error::Error for TransferError {}

impl TransferError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidIntent(_) => "INVALID_INTENT",
            Self::NetworkUnavailable(_) => "NETWORK_UNAVAILABLE",
            Self::UserRejected => "USER_REJECTED",
            Self::SignerUnavailable(_) => "SIGNER_UNAVAILABLE",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::InsufficientFundsAtSubmission(_) => "INSUFFICIENT_FUNDS_AT_SUBMISSION",
            Self::SubmissionRejected(_) => "SUBMISSION_REJECTED",
            Self::AlreadyInFlight(_) => "ALREADY_IN_FLIGHT",
            Self::AlreadySubmitted { .. } => "ALREADY_SUBMITTED",
            Self::RecordStore(_) => "RECORD_STORE_ERROR",
        }
    }

    /// Transient; retrying with backoff is reasonable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_) | Self::SignerUnavailable(_))
    }

    /// Fixable by the operator (bad input, declined prompt, empty wallet)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIntent(_)
                | Self::UserRejected
                | Self::InsufficientFunds { .. }
                | Self::InsufficientFundsAtSubmission(_)
                | Self::AlreadyInFlight(_)
                | Self::AlreadySubmitted { .. }
        )
    }

    /// Text safe to show a moderator
    pub fn user_message(&self) -> String {
        match self {
            Self::UserRejected => {
                "You declined the transaction in your wallet. Approve it to release the reward, or try again."
                    .to_string()
            }
            Self::InsufficientFunds { available, required } => format!(
                "Your wallet does not hold enough to pay this reward plus fees ({} available, {} required, in base units). Fund the wallet and try again.",
                available, required
            ),
            Self::InsufficientFundsAtSubmission(_) => {
                "The network rejected the transfer because the wallet balance is too low. Fund the wallet and try again."
                    .to_string()
            }
            Self::SubmissionRejected(reason) => format!("Transaction failed: {}", reason),
            Self::AlreadySubmitted {
                context_id,
                receipt_id,
            } => format!(
                "This reward was already sent as {}. Run `verify --context-id {}` to check it instead of paying again.",
                receipt_id, context_id
            ),
            other => other.to_string(),
        }
    }
}

/// Errors reported by a `NetworkClient`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Transport failure (connection refused, HTTP 5xx, ...)
    Unavailable(String),
    /// Request did not complete in time
    Timeout(String),
    /// Connection dropped after the request was written
    Interrupted(String),
    /// Node answered with a JSON-RPC error
    Rpc { code: i64, message: String },
    /// The chain moved past the transaction's last valid block height
    BlockHeightExceeded { last_valid_block_height: u64 },
    /// Response could not be decoded
    Decode(String),
}

/// Markers the node uses when a relay fails for lack of funds
const BALANCE_ERROR_MARKERS: &[&str] = &[
    "insufficient funds",
    "insufficient lamports",
    "insufficientfundsforfee",
    "insufficientfundsforrent",
    "no record of a prior credit",
    "accountnotfound",
    "resultwithnegativelamports",
];

impl NetworkError {
    pub fn is_balance_related(&self) -> bool {
        match self {
            Self::Rpc { message, .. } => {
                let lower = message.to_lowercase();
                // system program error 0x1 is ResultWithNegativeLamports
                let negative_lamports = lower.contains("custom program error")
                    && lower
                        .split(|c: char| !c.is_ascii_alphanumeric())
                        .any(|token| token == "0x1");
                negative_lamports || BALANCE_ERROR_MARKERS.iter().any(|m| lower.contains(m))
            }
            _ => false,
        }
    }

    /// The node refused the request itself, as opposed to not answering
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rpc { .. })
    }

    /// The request may have reached the node even though no answer came back
    pub fn delivery_uncertain(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Interrupted(_) | Self::Decode(_)
        )
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "node unavailable: {}", msg),
            Self::Timeout(msg) => write!(f, "request timed out: {}", msg),
            Self::Interrupted(msg) => write!(f, "connection interrupted: {}", msg),
            Self::Rpc { code, message } => write!(f, "rpc error {}: {}", code, message),
            Self::BlockHeightExceeded {
                last_valid_block_height,
            } => write!(
                f,
                "block height exceeded (last valid height {})",
                last_valid_block_height
            ),
            Self::Decode(msg) => write!(f, "undecodable response: {}", msg),
        }
    }
}

impl std::error::Error for NetworkError {}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout(err.to_string())
        } else if err.is_decode() {
            NetworkError::Decode(err.to_string())
        } else if err.is_connect() || err.is_builder() {
            // never left this process
            NetworkError::Unavailable(err.to_string())
        } else {
            NetworkError::Interrupted(err.to_string())
        }
    }
}

/// Errors reported by a `WalletSigner`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// The key holder declined the request
    UserRejected,
    /// Wallet not connected, locked, or unable to sign for this payer
    Unavailable(String),
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserRejected => write!(f, "user rejected the request"),
            Self::Unavailable(msg) => write!(f, "signer unavailable: {}", msg),
        }
    }
}

impl std::error::Error for SignerError {}
