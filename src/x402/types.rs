//! Wire types for the x402 `exact` payment scheme
//!
//! Covers both network families: EVM payloads carry an EIP-3009 authorization,
//! Solana payloads carry an ed25519-signed transfer authorization.

use alloy_primitives::U256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::chain::evm::SignedTransferWithAuthorization;
use crate::chain::svm::SignedSvmAuthorization;
use crate::chain::{
    Eip712Domain, Network, NetworkFamily, PaymentSigners, SignerError, SvmTransferAuthorization,
    TransferWithAuthorization, USDC,
};
use crate::x402::UnixTimestamp;

/// Decimals assumed when an asset is not a known USDC deployment
const DEFAULT_DECIMALS: u8 = 6;

/// Slack applied to `validAfter` so payer and facilitator clocks may disagree
const CLOCK_SKEW_SECS: u64 = 10 * 60;

// ============================================================================
// Protocol Version and Scheme
// ============================================================================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum X402Version {
    V1,
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported x402Version: {0}")]
pub struct X402VersionError(pub u8);

impl TryFrom<u8> for X402Version {
    type Error = X402VersionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(X402Version::V1),
            other => Err(X402VersionError(other)),
        }
    }
}

impl From<X402Version> for u8 {
    fn from(_: X402Version) -> Self {
        1
    }
}

fn default_x402_version() -> X402Version {
    X402Version::V1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Exact,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "exact")
    }
}

// ============================================================================
// Addresses and Nonces
// ============================================================================

/// An address on either network family, kept in its native text form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MixedAddress(pub String);

impl MixedAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MixedAddress {
    fn from(value: &str) -> Self {
        MixedAddress(value.to_string())
    }
}

impl From<String> for MixedAddress {
    fn from(value: String) -> Self {
        MixedAddress(value)
    }
}

impl Display for MixedAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexEncodedNonce(pub [u8; 32]);

impl HexEncodedNonce {
    pub fn random() -> Self {
        HexEncodedNonce(rand::random())
    }
}

impl Display for HexEncodedNonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for HexEncodedNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HexEncodedNonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        let nonce: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Nonce must be 32 bytes"))?;
        Ok(HexEncodedNonce(nonce))
    }
}

// ============================================================================
// Money Amount and Token Amount
// ============================================================================

/// A human-readable USD amount such as `0.05`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MoneyAmount(pub Decimal);

#[derive(Debug, thiserror::Error)]
pub enum MoneyAmountParseError {
    #[error("Failed to parse decimal")]
    DecimalParse,
    #[error("Negative amount not allowed")]
    Negative,
    #[error("Amount does not fit in token units")]
    Overflow,
}

impl MoneyAmount {
    /// Convert to integer token units, rounding to the nearest unit
    pub fn as_token_amount(&self, decimals: u8) -> Result<TokenAmount, MoneyAmountParseError> {
        let factor = Decimal::from_u64(10u64.pow(decimals as u32))
            .ok_or(MoneyAmountParseError::Overflow)?;
        let units = (self.0 * factor).round();
        let units = units.to_u128().ok_or(MoneyAmountParseError::Overflow)?;
        Ok(TokenAmount(U256::from(units)))
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim().trim_start_matches('$'))
            .map_err(|_| MoneyAmountParseError::DecimalParse)?;
        if decimal.is_sign_negative() {
            return Err(MoneyAmountParseError::Negative);
        }
        Ok(MoneyAmount(decimal))
    }
}

impl TryFrom<f64> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let decimal = Decimal::from_f64(value).ok_or(MoneyAmountParseError::DecimalParse)?;
        if decimal.is_sign_negative() {
            return Err(MoneyAmountParseError::Negative);
        }
        Ok(MoneyAmount(decimal))
    }
}

impl Display for MoneyAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0.normalize())
    }
}

/// An amount in the token's smallest unit, carried as a decimal string
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    /// Convert back to a human-readable amount; None if it exceeds u128
    pub fn as_money(&self, decimals: u8) -> Option<MoneyAmount> {
        let raw: u128 = self.0.try_into().ok()?;
        let raw = i128::try_from(raw).ok()?;
        Decimal::try_from_i128_with_scale(raw, decimals as u32)
            .ok()
            .map(MoneyAmount)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_str(&s)
            .map(TokenAmount)
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Token Asset and Deployment
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenAsset {
    pub address: MixedAddress,
    pub network: Network,
}

impl Display for TokenAsset {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.address, self.network)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenDeploymentEip712 {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenDeployment {
    #[serde(flatten)]
    pub asset: TokenAsset,
    pub decimals: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eip712: Option<TokenDeploymentEip712>,
}

impl TokenDeployment {
    pub fn network(&self) -> Network {
        self.asset.network
    }

    /// The `extra` block advertised alongside requirements for this token
    pub fn extra(&self) -> Option<serde_json::Value> {
        self.eip712.as_ref().map(|eip712| {
            serde_json::json!({ "name": eip712.name, "version": eip712.version })
        })
    }
}

// ============================================================================
// Payment Payload
// ============================================================================

/// Scheme payload; the shape is decided by the network family
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExactPayload {
    Evm(SignedTransferWithAuthorization),
    Svm(SignedSvmAuthorization),
}

impl ExactPayload {
    pub fn payer(&self) -> &str {
        match self {
            ExactPayload::Evm(signed) => &signed.authorization.from,
            ExactPayload::Svm(signed) => &signed.authorization.from,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentPayload {
    #[serde(rename = "x402Version", default = "default_x402_version")]
    pub x402_version: X402Version,
    pub scheme: Scheme,
    pub network: Network,
    pub payload: ExactPayload,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentPayloadDecodeError {
    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid payment payload JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl PaymentPayload {
    /// Base64 of the JSON encoding, the form carried in `_meta["x402/payment"]`
    pub fn to_base64(&self) -> Result<String, serde_json::Error> {
        Ok(b64.encode(serde_json::to_vec(self)?))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, PaymentPayloadDecodeError> {
        let bytes = b64.decode(encoded.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Accept either the base64 string form or an inline JSON object
    pub fn from_meta(value: &serde_json::Value) -> Result<Self, PaymentPayloadDecodeError> {
        match value {
            serde_json::Value::String(encoded) => Self::from_base64(encoded),
            other => Ok(serde_json::from_value(other.clone())?),
        }
    }
}

// ============================================================================
// Payment Requirements
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequirements {
    pub scheme: Scheme,
    pub network: Network,
    #[serde(rename = "maxAmountRequired")]
    pub max_amount_required: TokenAmount,
    pub resource: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(rename = "payTo")]
    pub pay_to: MixedAddress,
    #[serde(rename = "maxTimeoutSeconds")]
    pub max_timeout_seconds: u64,
    pub asset: MixedAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentSignError {
    #[error("Clock error: {0}")]
    Clock(#[source] std::time::SystemTimeError),
    #[error("No {0} signer configured")]
    NoSigner(NetworkFamily),
    #[error("Missing EIP-712 domain for asset {0}")]
    MissingDomain(MixedAddress),
    #[error("Signing failed: {0}")]
    Signing(#[from] SignerError),
}

fn json_string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(ToOwned::to_owned)
}

impl PaymentRequirements {
    /// The known deployment for this asset, if it is USDC on its network
    fn known_token(&self) -> Option<&'static USDC> {
        USDC::try_by_network(self.network)
            .filter(|usdc| usdc.0.asset.address.as_str().eq_ignore_ascii_case(self.asset.as_str()))
    }

    /// The required amount in USD, assuming a dollar-pegged asset
    pub fn amount_usd(&self) -> Option<MoneyAmount> {
        let decimals = self
            .known_token()
            .map(|usdc| usdc.0.decimals)
            .unwrap_or(DEFAULT_DECIMALS);
        self.max_amount_required.as_money(decimals)
    }

    /// EIP-712 domain from `extra`, falling back to the known deployment
    fn eip712_domain(&self) -> Result<Eip712Domain, PaymentSignError> {
        let from_extra = self.extra.as_ref().and_then(|extra| {
            Some((json_string_field(extra, "name")?, json_string_field(extra, "version")?))
        });
        let from_known = || {
            self.known_token()
                .and_then(|usdc| usdc.0.eip712.as_ref())
                .map(|eip712| (eip712.name.clone(), eip712.version.clone()))
        };
        let (name, version) = from_extra
            .or_else(from_known)
            .ok_or_else(|| PaymentSignError::MissingDomain(self.asset.clone()))?;

        let chain_id = self
            .network
            .chain_id()
            .ok_or(PaymentSignError::NoSigner(NetworkFamily::Evm))?;
        let verifying_contract = self
            .asset
            .as_str()
            .parse()
            .map_err(|_| SignerError::InvalidAddress(self.asset.to_string()))?;

        Ok(Eip712Domain {
            name,
            version,
            chain_id,
            verifying_contract,
        })
    }

    /// Sign a payment authorization for these requirements with the signer
    /// matching the network family.
    pub fn sign(&self, signers: &PaymentSigners) -> Result<PaymentPayload, PaymentSignError> {
        let family = self.network.family();
        let now = UnixTimestamp::try_now().map_err(PaymentSignError::Clock)?;
        let valid_before = now + self.max_timeout_seconds;
        let nonce = HexEncodedNonce::random();

        let payload = match family {
            NetworkFamily::Evm => {
                let signer = signers.evm.as_ref().ok_or(PaymentSignError::NoSigner(family))?;
                let domain = self.eip712_domain()?;
                let authorization = TransferWithAuthorization {
                    from: signer.address().to_string(),
                    to: self.pay_to.to_string(),
                    value: self.max_amount_required,
                    valid_after: UnixTimestamp(now.seconds_since_epoch().saturating_sub(CLOCK_SKEW_SECS)),
                    valid_before,
                    nonce,
                };
                ExactPayload::Evm(authorization.sign(&domain, signer)?)
            }
            NetworkFamily::Svm => {
                let signer = signers.svm.as_ref().ok_or(PaymentSignError::NoSigner(family))?;
                let authorization = SvmTransferAuthorization {
                    from: signer.address(),
                    to: self.pay_to.to_string(),
                    asset: self.asset.to_string(),
                    value: self.max_amount_required,
                    valid_before,
                    nonce,
                };
                ExactPayload::Svm(authorization.sign(signer)?)
            }
        };

        Ok(PaymentPayload {
            x402_version: X402Version::V1,
            scheme: Scheme::Exact,
            network: self.network,
            payload,
        })
    }
}

/// Body of a payment-required answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequiredResponse {
    #[serde(rename = "x402Version", default = "default_x402_version")]
    pub x402_version: X402Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
}

/// Parse an `accepts` array, skipping entries on networks or schemes this
/// crate does not know
pub fn parse_accepts(value: &serde_json::Value) -> Vec<PaymentRequirements> {
    value
        .get("accepts")
        .and_then(|accepts| accepts.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match serde_json::from_value(entry.clone()) {
                    Ok(requirements) => Some(requirements),
                    Err(e) => {
                        tracing::debug!(target: "x402-pay", "Skipping payment option: {}", e);
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// Verify and Settle Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    #[serde(rename = "x402Version")]
    pub x402_version: X402Version,
    #[serde(rename = "paymentPayload")]
    pub payment_payload: PaymentPayload,
    #[serde(rename = "paymentRequirements")]
    pub payment_requirements: PaymentRequirements,
}

pub type SettleRequest = VerifyRequest;

impl VerifyRequest {
    pub fn new(payment_payload: PaymentPayload, payment_requirements: PaymentRequirements) -> Self {
        Self {
            x402_version: X402Version::V1,
            payment_payload,
            payment_requirements,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FacilitatorErrorReason {
    Structured {
        #[serde(rename = "type")]
        error_type: String,
        message: Option<String>,
    },
    FreeForm(String),
}

impl Display for FacilitatorErrorReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FacilitatorErrorReason::Structured { error_type, message: Some(message) } => {
                write!(f, "{error_type}: {message}")
            }
            FacilitatorErrorReason::Structured { error_type, message: None } => {
                write!(f, "{error_type}")
            }
            FacilitatorErrorReason::FreeForm(reason) => write!(f, "{reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(rename = "isValid")]
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<MixedAddress>,
    #[serde(rename = "invalidReason", alias = "errorReason", default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<FacilitatorErrorReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettleResponse {
    pub success: bool,
    #[serde(rename = "errorReason", default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<FacilitatorErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<MixedAddress>,
    /// Transaction hash (EVM) or signature (Solana); empty strings read as None
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_non_empty")]
    pub transaction: Option<String>,
    pub network: Network,
}

fn deserialize_non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::evm::recover_address;
    use crate::chain::{EvmSigner, SvmSigner};
    use serde_json::json;

    fn requirements(network: Network, asset: &str, pay_to: &str) -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Exact,
            network,
            max_amount_required: TokenAmount(U256::from(50_000u64)),
            resource: "mcp://tool/get_business_news".to_string(),
            description: "news".to_string(),
            mime_type: "application/json".to_string(),
            output_schema: None,
            pay_to: MixedAddress::from(pay_to),
            max_timeout_seconds: 300,
            asset: MixedAddress::from(asset),
            extra: None,
        }
    }

    fn signers() -> PaymentSigners {
        PaymentSigners::new(EvmSigner::random(), SvmSigner::random())
    }

    #[test]
    fn test_money_to_token_amount() {
        let price: MoneyAmount = "0.05".parse().unwrap();
        assert_eq!(price.as_token_amount(6).unwrap(), TokenAmount(U256::from(50_000u64)));

        let dollars: MoneyAmount = "$1.234567891".parse().unwrap();
        assert_eq!(dollars.as_token_amount(6).unwrap(), TokenAmount(U256::from(1_234_568u64)));

        assert!(matches!("-1".parse::<MoneyAmount>(), Err(MoneyAmountParseError::Negative)));
        assert!("abc".parse::<MoneyAmount>().is_err());
    }

    #[test]
    fn test_token_amount_as_money() {
        let amount = TokenAmount(U256::from(50_000u64));
        assert_eq!(amount.as_money(6).unwrap(), "0.05".parse().unwrap());
        assert_eq!(TokenAmount(U256::MAX).as_money(6), None);
    }

    #[test]
    fn test_evm_sign_uses_known_domain() {
        let signers = signers();
        let req = requirements(
            Network::BaseSepolia,
            "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "0x2222222222222222222222222222222222222222",
        );

        let payload = req.sign(&signers).unwrap();
        let ExactPayload::Evm(signed) = &payload.payload else {
            panic!("expected EVM payload");
        };

        let domain = req.eip712_domain().unwrap();
        assert_eq!(domain.name, "USDC");
        let hash = signed.authorization.eip712_hash(&domain).unwrap();
        let payer = signers.evm.as_ref().unwrap().address();
        assert_eq!(recover_address(&signed.signature, &hash).unwrap(), payer);
        assert_eq!(payload.payload.payer(), payer.to_string());
    }

    #[test]
    fn test_svm_sign_and_base64_meta() {
        let signers = signers();
        let pay_to = SvmSigner::random().address();
        let req = requirements(
            Network::SolanaDevnet,
            "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
            &pay_to,
        );

        let payload = req.sign(&signers).unwrap();
        let ExactPayload::Svm(signed) = &payload.payload else {
            panic!("expected SVM payload");
        };
        assert!(signed.verify().is_ok());
        assert_eq!(signed.authorization.to, pay_to);

        let encoded = payload.to_base64().unwrap();
        let decoded = PaymentPayload::from_meta(&json!(encoded)).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_sign_without_matching_signer() {
        let signers = PaymentSigners {
            evm: Some(EvmSigner::random()),
            svm: None,
        };
        let req = requirements(Network::Solana, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "x");
        assert!(matches!(
            req.sign(&signers),
            Err(PaymentSignError::NoSigner(NetworkFamily::Svm))
        ));
    }

    #[test]
    fn test_parse_accepts_skips_unknown_networks() {
        let body = json!({
            "x402Version": 1,
            "accepts": [
                {
                    "scheme": "exact", "network": "polygon", "maxAmountRequired": "10",
                    "resource": "r", "payTo": "0x1", "maxTimeoutSeconds": 60, "asset": "0x2"
                },
                {
                    "scheme": "exact", "network": "base", "maxAmountRequired": "10",
                    "resource": "r", "payTo": "0x1", "maxTimeoutSeconds": 60, "asset": "0x2"
                }
            ]
        });
        let accepts = parse_accepts(&body);
        assert_eq!(accepts.len(), 1);
        assert_eq!(accepts[0].network, Network::Base);

        assert!(parse_accepts(&json!({"error": "nope"})).is_empty());
    }

    #[test]
    fn test_settle_response_empty_transaction() {
        let settle: SettleResponse = serde_json::from_value(json!({
            "success": false,
            "errorReason": "insufficient_funds",
            "transaction": "",
            "network": "base"
        }))
        .unwrap();
        assert_eq!(settle.transaction, None);
        assert_eq!(
            settle.error_reason,
            Some(FacilitatorErrorReason::FreeForm("insufficient_funds".into()))
        );
    }
}
