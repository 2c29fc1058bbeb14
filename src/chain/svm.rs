//! Solana (SVM) payment identity
//!
//! Keys are ed25519; addresses are the base58 public key. Secrets are accepted
//! in the formats Solana tooling emits: base58 of the 64-byte keypair, base58
//! of the 32-byte seed, or a JSON byte array (`solana-keygen` files).
//!
//! The payload is an ed25519-signed transfer authorization. Building and
//! submitting the SPL transfer transaction is the facilitator's job.
//!
//! Known limitation: the x402 `exact` scheme on Solana expects a partially
//! signed SPL transfer transaction, which this module does not build.
//! Facilitators following that scheme will reject these payloads. Network
//! selection ranks every EVM offer above Solana, so an SVM payload is only
//! produced when a server offers nothing else or no EVM key is configured.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::x402::UnixTimestamp;
use crate::x402::types::{HexEncodedNonce, TokenAmount};

use super::SignerError;

#[derive(Clone)]
pub struct SvmSigner {
    key: SigningKey,
}

impl SvmSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn random() -> Self {
        Self::new(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    /// Parse a secret in any supported encoding
    pub fn from_secret(secret: &str) -> Result<Self, SignerError> {
        let secret = secret.trim();
        let bytes = if secret.starts_with('[') {
            serde_json::from_str::<Vec<u8>>(secret)
                .map_err(|_| SignerError::InvalidEncoding("json byte array"))?
        } else {
            bs58::decode(secret)
                .into_vec()
                .map_err(|_| SignerError::InvalidEncoding("base58"))?
        };
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, SignerError> {
        match bytes.len() {
            32 => {
                let seed: [u8; 32] = bytes.try_into().map_err(|_| SignerError::InvalidKey)?;
                Ok(Self::new(SigningKey::from_bytes(&seed)))
            }
            64 => {
                let keypair: [u8; 64] = bytes.try_into().map_err(|_| SignerError::InvalidKey)?;
                // Rejects keypairs whose public half does not match the secret
                let key = SigningKey::from_keypair_bytes(&keypair)
                    .map_err(|_| SignerError::InvalidKey)?;
                Ok(Self::new(key))
            }
            _ => Err(SignerError::InvalidKey),
        }
    }

    /// Base58 public key
    pub fn address(&self) -> String {
        bs58::encode(self.key.verifying_key().as_bytes()).into_string()
    }

    pub fn sign_message(&self, message: &[u8]) -> Signature {
        self.key.sign(message)
    }
}

impl FromStr for SvmSigner {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_secret(s)
    }
}

impl fmt::Debug for SvmSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SvmSigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Transfer authorization for an SPL token payment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SvmTransferAuthorization {
    pub from: String,
    pub to: String,
    pub asset: String,
    pub value: TokenAmount,
    #[serde(rename = "validBefore")]
    pub valid_before: UnixTimestamp,
    pub nonce: HexEncodedNonce,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignedSvmAuthorization {
    /// Base58 ed25519 signature over the canonical JSON authorization
    pub signature: String,
    pub authorization: SvmTransferAuthorization,
}

impl SvmTransferAuthorization {
    fn message(&self) -> Result<Vec<u8>, SignerError> {
        serde_json::to_vec(self).map_err(|_| SignerError::SigningFailed)
    }

    pub fn sign(self, signer: &SvmSigner) -> Result<SignedSvmAuthorization, SignerError> {
        let signature = signer.sign_message(&self.message()?);
        Ok(SignedSvmAuthorization {
            signature: bs58::encode(signature.to_bytes()).into_string(),
            authorization: self,
        })
    }
}

impl SignedSvmAuthorization {
    /// Check the signature against the `from` public key
    pub fn verify(&self) -> Result<(), SignerError> {
        let from = bs58::decode(&self.authorization.from)
            .into_vec()
            .map_err(|_| SignerError::InvalidAddress(self.authorization.from.clone()))?;
        let from: [u8; 32] = from
            .try_into()
            .map_err(|_| SignerError::InvalidAddress(self.authorization.from.clone()))?;
        let key = VerifyingKey::from_bytes(&from)
            .map_err(|_| SignerError::InvalidAddress(self.authorization.from.clone()))?;

        let sig_bytes = bs58::decode(&self.signature)
            .into_vec()
            .map_err(|_| SignerError::InvalidSignature)?;
        let signature =
            Signature::from_slice(&sig_bytes).map_err(|_| SignerError::InvalidSignature)?;

        key.verify(&self.authorization.message()?, &signature)
            .map_err(|_| SignerError::InvalidSignature)
    }
}
