//! Transfer module - main module file
//!
//! Reward payouts as a three-stage flow: build an unsigned transaction,
//! have the wallet sign and relay it, then verify what the network did.

pub mod types;
pub mod errors;
pub mod wire;
pub mod state;
pub mod observer;
pub mod builder;
pub mod coordinator;
pub mod verifier;
pub mod record;
pub mod pipeline;
pub mod adapters;

// Re-export commonly used types
pub use builder::TransferRequestBuilder;
pub use coordinator::{SigningCoordinator, SubmitOptions};
pub use errors::{NetworkError, SignerError, TransferError};
pub use observer::{ChannelObserver, LogObserver, PhaseObserver, PhaseUpdate, RecordingObserver};
pub use pipeline::TransferPipeline;
pub use record::{explorer_url, RecordStatus, RecordStore, RecordUpdate, StoredRecord};
pub use state::{TransferEvent, TransferPhase};
pub use types::{
    Address, Commitment, SubmissionReceipt, TransferIntent, TransferOutcome, UnsignedTransaction,
};
pub use verifier::{ConfirmationVerifier, RecordingSleeper, Sleeper, TokioSleeper, VerifierConfig};
