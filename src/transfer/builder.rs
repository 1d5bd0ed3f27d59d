//! Transfer Request Builder
//!
//! Turns a `TransferIntent` into a network-ready `UnsignedTransaction`.

use crate::transfer::adapters::NetworkClient;
use crate::transfer::errors::TransferError;
use crate::transfer::types::{to_base_units, TransferIntent, UnsignedTransaction};
use crate::transfer::wire;

pub struct TransferRequestBuilder;

impl TransferRequestBuilder {
    /// Validate the intent, fetch freshness metadata, and encode the message
    ///
    /// Validation happens before any network round-trip. A failed metadata
    /// fetch is reported as `NetworkUnavailable` and not retried here.
    pub async fn build(
        intent: &TransferIntent,
        network: &dyn NetworkClient,
    ) -> Result<UnsignedTransaction, TransferError> {
        let lamports = to_base_units(intent.amount)?;

        if intent.payer == intent.payee {
            return Err(TransferError::InvalidIntent(
                "payer and payee must differ".to_string(),
            ));
        }

        let payer = intent
            .payer
            .to_bytes()
            .map_err(|e| TransferError::InvalidIntent(format!("payer: {}", e)))?;
        let payee = intent
            .payee
            .to_bytes()
            .map_err(|e| TransferError::InvalidIntent(format!("payee: {}", e)))?;

        let freshness = network.get_latest_blockhash().await.map_err(|e| {
            log::warn!("[{}] blockhash fetch failed: {}", intent.context_id, e);
            TransferError::NetworkUnavailable(format!("failed to fetch recent blockhash: {}", e))
        })?;

        let blockhash = wire::decode_blockhash(&freshness.blockhash)
            .map_err(TransferError::NetworkUnavailable)?;

        let message = wire::encode_transfer_message(&payer, &payee, &blockhash, lamports);

        log::info!(
            "[{}] built transfer {} -> {} ({} base units, valid until height {})",
            intent.context_id,
            intent.payer,
            intent.payee,
            lamports,
            freshness.last_valid_block_height
        );

        Ok(UnsignedTransaction {
            payer: intent.payer.clone(),
            payee: intent.payee.clone(),
            lamports,
            context_id: intent.context_id.clone(),
            freshness,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::adapters::MockNetwork;
    use crate::transfer::errors::NetworkError;
    use crate::transfer::types::Address;
    use rust_decimal::Decimal;

    const PAYER: &str = "4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi";
    const PAYEE: &str = "8qbHbw2BbbTHBW1sbeqakYXVKRQM8Ne7pLK7m6CVfeR";

    fn intent(amount: Decimal) -> TransferIntent {
        TransferIntent {
            payer: Address::new(PAYER),
            payee: Address::new(PAYEE),
            amount,
            context_id: "sub-42".to_string(),
        }
    }

    #[tokio::test]
    async fn test_build_valid_intent() {
        let network = MockNetwork::new();
        let unsigned = TransferRequestBuilder::build(&intent(Decimal::new(5, 2)), &network)
            .await
            .unwrap();

        assert_eq!(unsigned.lamports, 50_000_000);
        assert_eq!(unsigned.freshness.last_valid_block_height, 1_000);
        assert_eq!(&unsigned.message[4..36], &[1u8; 32]);
        assert_eq!(&unsigned.message[36..68], &[2u8; 32]);
        assert_eq!(network.call_count("get_latest_blockhash"), 1);
        assert_eq!(network.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amount_without_network() {
        let network = MockNetwork::new();
        for amount in [Decimal::ZERO, Decimal::new(-5, 2)] {
            let err = TransferRequestBuilder::build(&intent(amount), &network)
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::InvalidIntent(_)));
        }
        assert_eq!(network.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejects_self_transfer_without_network() {
        let network = MockNetwork::new();
        let mut req = intent(Decimal::ONE);
        req.payee = req.payer.clone();

        let err = TransferRequestBuilder::build(&req, &network).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidIntent(_)));
        assert_eq!(network.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejects_malformed_address_without_network() {
        let network = MockNetwork::new();
        let mut req = intent(Decimal::ONE);
        req.payee = Address::new("not-an-address");

        let err = TransferRequestBuilder::build(&req, &network).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidIntent(ref m) if m.starts_with("payee")));
        assert_eq!(network.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_blockhash_failure_is_network_unavailable() {
        let network = MockNetwork::new();
        network.set_blockhash(Err(NetworkError::Timeout("10s".to_string())));

        let err = TransferRequestBuilder::build(&intent(Decimal::ONE), &network)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::NetworkUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(network.call_count("get_latest_blockhash"), 1);
    }
}
