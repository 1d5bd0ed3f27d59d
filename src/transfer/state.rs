//! Transfer Phase Machine
//!
//! Defines the phases a reward transfer moves through, the events that drive
//! it, and the transition function. UIs subscribe to phase changes through a
//! `PhaseObserver` instead of being driven from inside the transfer logic.

use serde::{Deserialize, Serialize};

/// Transfer phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    /// Intent accepted, transaction being built and checked
    Pending,
    /// Waiting on the wallet
    Signing,
    /// Signed, being relayed to the network
    Sending,
    /// Relayed, verification cascade running
    Confirming,
    /// Transfer executed ✅
    Confirmed,
    /// Transfer rejected or failed on chain ❌
    Failed,
    /// Outcome could not be proven, needs a manual check
    Unverifiable,
}

impl TransferPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferPhase::Pending => "pending",
            TransferPhase::Signing => "signing",
            TransferPhase::Sending => "sending",
            TransferPhase::Confirming => "confirming",
            TransferPhase::Confirmed => "confirmed",
            TransferPhase::Failed => "failed",
            TransferPhase::Unverifiable => "unverifiable",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransferPhase::Pending),
            "signing" => Some(TransferPhase::Signing),
            "sending" => Some(TransferPhase::Sending),
            "confirming" => Some(TransferPhase::Confirming),
            "confirmed" => Some(TransferPhase::Confirmed),
            "failed" => Some(TransferPhase::Failed),
            "unverifiable" => Some(TransferPhase::Unverifiable),
            _ => None,
        }
    }

    /// Check if this is a terminal phase (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferPhase::Confirmed | TransferPhase::Failed | TransferPhase::Unverifiable
        )
    }

    /// Once the network has the transaction the flow can no longer be cancelled
    pub fn is_cancellable(&self) -> bool {
        matches!(self, TransferPhase::Pending | TransferPhase::Signing)
    }
}

/// Events that trigger phase transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    /// Handed to the wallet
    SignRequested,
    /// Wallet returned a signed transaction
    Signed,
    /// Network accepted the relay and returned an id
    Submitted,
    /// Verification proved execution
    Verified,
    /// Anything that ends the flow with a failure
    Rejected,
    /// Verification could not decide
    Inconclusive,
}

/// Phase transition function
///
/// Invalid transitions return the current phase (no change).
pub fn transition(current: TransferPhase, event: TransferEvent) -> TransferPhase {
    use TransferEvent::*;
    use TransferPhase::*;

    match (current, event) {
        // From Pending
        (Pending, SignRequested) => Signing,
        (Pending, Rejected) => Failed,

        // From Signing
        (Signing, Signed) => Sending,
        (Signing, Rejected) => Failed,

        // From Sending
        (Sending, Submitted) => Confirming,
        (Sending, Rejected) => Failed,

        // From Confirming
        (Confirming, Verified) => Confirmed,
        (Confirming, Rejected) => Failed,
        (Confirming, Inconclusive) => Unverifiable,

        // Invalid transitions - stay in current phase
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(TransferPhase::Confirmed.is_terminal());
        assert!(TransferPhase::Failed.is_terminal());
        assert!(TransferPhase::Unverifiable.is_terminal());

        assert!(!TransferPhase::Pending.is_terminal());
        assert!(!TransferPhase::Signing.is_terminal());
        assert!(!TransferPhase::Sending.is_terminal());
        assert!(!TransferPhase::Confirming.is_terminal());
    }

    #[test]
    fn test_cancellable_only_before_relay() {
        assert!(TransferPhase::Pending.is_cancellable());
        assert!(TransferPhase::Signing.is_cancellable());
        assert!(!TransferPhase::Sending.is_cancellable());
        assert!(!TransferPhase::Confirming.is_cancellable());
    }

    #[test]
    fn test_phase_to_string_roundtrip() {
        let phases = vec![
            TransferPhase::Pending,
            TransferPhase::Signing,
            TransferPhase::Sending,
            TransferPhase::Confirming,
            TransferPhase::Confirmed,
            TransferPhase::Failed,
            TransferPhase::Unverifiable,
        ];

        for phase in phases {
            assert_eq!(TransferPhase::from_str(phase.as_str()), Some(phase));
        }
        assert!(TransferPhase::from_str("CONFIRMED").is_none());
    }

    #[test]
    fn test_happy_path() {
        let mut phase = TransferPhase::Pending;

        phase = transition(phase, TransferEvent::SignRequested);
        assert_eq!(phase, TransferPhase::Signing);

        phase = transition(phase, TransferEvent::Signed);
        assert_eq!(phase, TransferPhase::Sending);

        phase = transition(phase, TransferEvent::Submitted);
        assert_eq!(phase, TransferPhase::Confirming);

        phase = transition(phase, TransferEvent::Verified);
        assert_eq!(phase, TransferPhase::Confirmed);
    }

    #[test]
    fn test_rejection_from_every_live_phase() {
        for phase in [
            TransferPhase::Pending,
            TransferPhase::Signing,
            TransferPhase::Sending,
            TransferPhase::Confirming,
        ] {
            assert_eq!(transition(phase, TransferEvent::Rejected), TransferPhase::Failed);
        }
    }

    #[test]
    fn test_inconclusive_only_while_confirming() {
        assert_eq!(
            transition(TransferPhase::Confirming, TransferEvent::Inconclusive),
            TransferPhase::Unverifiable
        );
        assert_eq!(
            transition(TransferPhase::Sending, TransferEvent::Inconclusive),
            TransferPhase::Sending
        );
    }

    #[test]
    fn test_terminal_phase_is_stable() {
        assert_eq!(
            transition(TransferPhase::Confirmed, TransferEvent::Rejected),
            TransferPhase::Confirmed
        );
        assert_eq!(
            transition(TransferPhase::Failed, TransferEvent::Verified),
            TransferPhase::Failed
        );
        assert_eq!(
            transition(TransferPhase::Unverifiable, TransferEvent::Verified),
            TransferPhase::Unverifiable
        );
    }

    #[test]
    fn test_skipping_signing_is_invalid() {
        assert_eq!(
            transition(TransferPhase::Pending, TransferEvent::Submitted),
            TransferPhase::Pending
        );
    }
}
