//! EVM payment signing: secp256k1 keys and EIP-3009 `TransferWithAuthorization`
//!
//! The x402 `exact` scheme on EVM chains asks the payer to sign a USDC
//! transfer authorization under the token's EIP-712 domain. The facilitator
//! submits it on-chain; we only produce the signature.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{keccak256, Address, Signature, B256, U256};
use k256::ecdsa::{SigningKey, VerifyingKey};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::x402::UnixTimestamp;
use crate::x402::types::{HexEncodedNonce, TokenAmount};

use super::SignerError;

static EIP712_DOMAIN_TYPE_HASH: Lazy<[u8; 32]> = Lazy::new(|| {
    keccak256("EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)").into()
});

static TRANSFER_WITH_AUTHORIZATION_TYPE_HASH: Lazy<[u8; 32]> = Lazy::new(|| {
    keccak256("TransferWithAuthorization(address from,address to,uint256 value,uint256 validAfter,uint256 validBefore,bytes32 nonce)").into()
});

// ============================================================================
// Signer
// ============================================================================

/// A secp256k1 private key with its derived Ethereum address
#[derive(Clone)]
pub struct EvmSigner {
    key: SigningKey,
    address: Address,
}

impl EvmSigner {
    pub fn new(key: SigningKey) -> Self {
        let address = address_from_verifying_key(key.verifying_key());
        Self { key, address }
    }

    pub fn random() -> Self {
        use k256::elliptic_curve::rand_core::OsRng;
        Self::new(SigningKey::random(&mut OsRng))
    }

    /// Parse a 32-byte private key from hex (with or without 0x prefix)
    pub fn from_hex(s: &str) -> Result<Self, SignerError> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| SignerError::InvalidEncoding("hex"))?;
        let key = SigningKey::from_slice(&bytes).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self::new(key))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte prehash, returning an (r, s, v) signature with v = 27/28
    pub fn sign_hash(&self, hash: &B256) -> Result<Signature, SignerError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|_| SignerError::SigningFailed)?;

        let r_bytes: [u8; 32] = signature.r().to_bytes().into();
        let s_bytes: [u8; 32] = signature.s().to_bytes().into();

        let mut sig_bytes = [0u8; 65];
        sig_bytes[0..32].copy_from_slice(&r_bytes);
        sig_bytes[32..64].copy_from_slice(&s_bytes);
        sig_bytes[64] = recovery_id.to_byte() + 27;

        Signature::try_from(&sig_bytes[..]).map_err(|_| SignerError::SigningFailed)
    }
}

impl FromStr for EvmSigner {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for EvmSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    // Uncompressed point is 0x04 || x || y; the address is the last 20 bytes
    // of keccak256(x || y).
    let public_key = key.to_encoded_point(false);
    let hash = keccak256(&public_key.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Recover the signing address from a 65-byte signature over `hash`
#[cfg(test)]
pub(crate) fn recover_address(signature: &[u8], hash: &B256) -> Result<Address, SignerError> {
    if signature.len() != 65 {
        return Err(SignerError::InvalidSignature);
    }

    let sig = k256::ecdsa::Signature::from_slice(&signature[..64])
        .map_err(|_| SignerError::InvalidSignature)?;
    let v = signature[64];
    let recid = k256::ecdsa::RecoveryId::from_byte(if v >= 27 { v - 27 } else { v })
        .ok_or(SignerError::InvalidSignature)?;

    let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &sig, recid)
        .map_err(|_| SignerError::InvalidSignature)?;
    Ok(address_from_verifying_key(&key))
}

// ============================================================================
// EIP-712 domain and TransferWithAuthorization
// ============================================================================

#[derive(Debug, Clone)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Eip712Domain {
    fn separator(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(160);
        encoded.extend_from_slice(&*EIP712_DOMAIN_TYPE_HASH);
        encoded.extend_from_slice(keccak256(self.name.as_bytes()).as_slice());
        encoded.extend_from_slice(keccak256(self.version.as_bytes()).as_slice());
        encoded.extend_from_slice(&U256::from(self.chain_id).to_be_bytes::<32>());
        encoded.extend_from_slice(&[0u8; 12]);
        encoded.extend_from_slice(self.verifying_contract.as_slice());
        keccak256(&encoded).into()
    }
}

/// EIP-3009 authorization fields as carried in the x402 payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferWithAuthorization {
    pub from: String,
    pub to: String,
    pub value: TokenAmount,
    #[serde(rename = "validAfter")]
    pub valid_after: UnixTimestamp,
    #[serde(rename = "validBefore")]
    pub valid_before: UnixTimestamp,
    pub nonce: HexEncodedNonce,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignedTransferWithAuthorization {
    #[serde(serialize_with = "serialize_hex_bytes", deserialize_with = "deserialize_hex_bytes")]
    pub signature: Vec<u8>,
    pub authorization: TransferWithAuthorization,
}

fn serialize_hex_bytes<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

fn deserialize_hex_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
}

impl TransferWithAuthorization {
    fn struct_hash(&self, from: &Address, to: &Address) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(224);
        encoded.extend_from_slice(&*TRANSFER_WITH_AUTHORIZATION_TYPE_HASH);
        encoded.extend_from_slice(&[0u8; 12]);
        encoded.extend_from_slice(from.as_slice());
        encoded.extend_from_slice(&[0u8; 12]);
        encoded.extend_from_slice(to.as_slice());
        encoded.extend_from_slice(&self.value.0.to_be_bytes::<32>());
        encoded.extend_from_slice(&U256::from(self.valid_after.0).to_be_bytes::<32>());
        encoded.extend_from_slice(&U256::from(self.valid_before.0).to_be_bytes::<32>());
        encoded.extend_from_slice(&self.nonce.0);
        keccak256(&encoded).into()
    }

    /// keccak256("\x19\x01" || domainSeparator || structHash)
    pub fn eip712_hash(&self, domain: &Eip712Domain) -> Result<B256, SignerError> {
        let from = Address::from_str(&self.from)
            .map_err(|_| SignerError::InvalidAddress(self.from.clone()))?;
        let to = Address::from_str(&self.to)
            .map_err(|_| SignerError::InvalidAddress(self.to.clone()))?;

        let mut encoded = Vec::with_capacity(66);
        encoded.extend_from_slice(b"\x19\x01");
        encoded.extend_from_slice(&domain.separator());
        encoded.extend_from_slice(&self.struct_hash(&from, &to));
        Ok(keccak256(&encoded))
    }

    pub fn sign(
        self,
        domain: &Eip712Domain,
        signer: &EvmSigner,
    ) -> Result<SignedTransferWithAuthorization, SignerError> {
        let hash = self.eip712_hash(domain)?;
        let signature = signer.sign_hash(&hash)?;
        Ok(SignedTransferWithAuthorization {
            signature: signature.as_bytes().to_vec(),
            authorization: self,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_authorization(from: Address) -> TransferWithAuthorization {
        TransferWithAuthorization {
            from: from.to_string(),
            to: "0x2222222222222222222222222222222222222222".to_string(),
            value: TokenAmount(U256::from(50_000u64)),
            valid_after: UnixTimestamp(0),
            valid_before: UnixTimestamp(u64::MAX),
            nonce: HexEncodedNonce([7u8; 32]),
        }
    }

    fn base_sepolia_domain() -> Eip712Domain {
        Eip712Domain {
            name: "USDC".to_string(),
            version: "2".to_string(),
            chain_id: 84532,
            verifying_contract: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".parse().unwrap(),
        }
    }

    #[test]
    fn test_from_hex_known_address() {
        let signer = EvmSigner::from_hex(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert_eq!(
            signer.address().to_string(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(matches!(
            EvmSigner::from_hex("not-a-key"),
            Err(SignerError::InvalidEncoding(_))
        ));
        // Zero is not a valid secp256k1 scalar
        assert!(matches!(
            EvmSigner::from_hex(&"00".repeat(32)),
            Err(SignerError::InvalidKey)
        ));
    }

    #[test]
    fn test_signed_authorization_recovers_payer() {
        let signer = EvmSigner::random();
        let domain = base_sepolia_domain();
        let auth = sample_authorization(signer.address());

        let hash = auth.eip712_hash(&domain).unwrap();
        let signed = auth.sign(&domain, &signer).unwrap();

        assert_eq!(signed.signature.len(), 65);
        assert_eq!(recover_address(&signed.signature, &hash).unwrap(), signer.address());
    }

    #[test]
    fn test_hash_depends_on_chain() {
        let signer = EvmSigner::random();
        let auth = sample_authorization(signer.address());
        let mut mainnet = base_sepolia_domain();
        mainnet.chain_id = 8453;

        assert_ne!(
            auth.eip712_hash(&base_sepolia_domain()).unwrap(),
            auth.eip712_hash(&mainnet).unwrap()
        );
    }
}
