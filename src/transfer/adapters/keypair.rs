//! Local keypair signer
//!
//! Signs with an ed25519 keypair held in process memory. Used by the CLI and
//! by unattended payout jobs where no browser wallet is involved.

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};

use super::traits::WalletSigner;
use crate::transfer::errors::SignerError;
use crate::transfer::types::{Address, SignedTransaction, UnsignedTransaction};

pub struct KeypairSigner {
    key: SigningKey,
    address: Address,
}

impl KeypairSigner {
    pub fn new(key: SigningKey) -> Self {
        let address = Address::from_bytes(&key.verifying_key().to_bytes());
        Self { key, address }
    }

    /// Load from a base58-encoded 64-byte secret (seed followed by public key)
    pub fn from_base58(secret: &str) -> Result<Self, SignerError> {
        let bytes = bs58::decode(secret.trim())
            .into_vec()
            .map_err(|e| SignerError::Unavailable(format!("keypair is not base58: {}", e)))?;

        let bytes: [u8; 64] = bytes.try_into().map_err(|b: Vec<u8>| {
            SignerError::Unavailable(format!("keypair must be 64 bytes, got {}", b.len()))
        })?;

        let key = SigningKey::from_keypair_bytes(&bytes)
            .map_err(|e| SignerError::Unavailable(format!("invalid keypair: {}", e)))?;

        Ok(Self::new(key))
    }

    /// Address this signer can pay from
    pub fn address(&self) -> &Address {
        &self.address
    }
}

#[async_trait]
impl WalletSigner for KeypairSigner {
    async fn sign_transaction(
        &self,
        unsigned: &UnsignedTransaction,
    ) -> Result<SignedTransaction, SignerError> {
        if unsigned.payer != self.address {
            return Err(SignerError::Unavailable(format!(
                "keypair controls {}, not payer {}",
                self.address, unsigned.payer
            )));
        }

        let signature = self.key.sign(&unsigned.message);

        Ok(SignedTransaction {
            signatures: vec![signature.to_bytes()],
            message: unsigned.message.clone(),
        })
    }

    fn name(&self) -> &str {
        "keypair"
    }
}
