//! Price gate for an inbound paid tool
//!
//! A [`Paywall`] turns a USD price plus the configured payout addresses into
//! the `accepts` list, and checks a presented payment against it through a
//! [`Facilitator`].

use tracing::{info, warn};

use crate::chain::{Network, NetworkFamily, USDC};

use super::Facilitator;
use super::types::{
    MixedAddress, MoneyAmount, MoneyAmountParseError, PaymentPayload, PaymentRequiredResponse,
    PaymentRequirements, Scheme, SettleResponse, TokenDeployment, VerifyRequest, X402Version,
};

/// Seconds a signed authorization stays valid
const PAYMENT_TIMEOUT_SECS: u64 = 600;

/// Where payments for the tool are sent
#[derive(Debug, Clone, Default)]
pub struct Recipients {
    pub evm_pay_to: Option<String>,
    pub solana_pay_to: Option<String>,
    pub testnet: bool,
}

impl Recipients {
    fn pay_to(&self, family: NetworkFamily) -> Option<&str> {
        let address = match family {
            NetworkFamily::Evm => self.evm_pay_to.as_deref(),
            NetworkFamily::Svm => self.solana_pay_to.as_deref(),
        };
        address.map(str::trim).filter(|a| !a.is_empty())
    }
}

/// A price on one token deployment, paid to one address
#[derive(Debug, Clone)]
pub struct PriceTag {
    pub token: TokenDeployment,
    pub amount: MoneyAmount,
    pub pay_to: MixedAddress,
}

#[derive(Debug, thiserror::Error)]
pub enum PaywallError {
    #[error("No payout address configured")]
    NoRecipients,
    #[error("Invalid price: {0}")]
    Price(#[from] MoneyAmountParseError),
    #[error("Payment on {0} is not accepted")]
    UnsupportedNetwork(Network),
    #[error("Facilitator error: {0}")]
    Facilitator(String),
    #[error("Payment invalid: {0}")]
    Invalid(String),
    #[error("Payment settlement failed: {0}")]
    Settlement(String),
}

#[derive(Debug, Clone)]
pub struct Paywall {
    requirements: Vec<PaymentRequirements>,
}

impl Paywall {
    /// Price tags for every network family that has a payout address
    pub fn price_tags(price: MoneyAmount, recipients: &Recipients) -> Vec<PriceTag> {
        [NetworkFamily::Evm, NetworkFamily::Svm]
            .into_iter()
            .filter_map(|family| {
                let pay_to = recipients.pay_to(family)?;
                let network = Network::for_family(family, recipients.testnet);
                let usdc = USDC::try_by_network(network)?;
                Some(PriceTag {
                    token: usdc.0.clone(),
                    amount: price,
                    pay_to: MixedAddress::from(pay_to),
                })
            })
            .collect()
    }

    pub fn new(
        price: MoneyAmount,
        recipients: &Recipients,
        resource: &str,
        description: &str,
    ) -> Result<Self, PaywallError> {
        let requirements = Self::price_tags(price, recipients)
            .into_iter()
            .map(|tag| {
                Ok(PaymentRequirements {
                    scheme: Scheme::Exact,
                    network: tag.token.network(),
                    max_amount_required: tag.amount.as_token_amount(tag.token.decimals)?,
                    resource: resource.to_string(),
                    description: description.to_string(),
                    mime_type: "application/json".to_string(),
                    output_schema: None,
                    pay_to: tag.pay_to,
                    max_timeout_seconds: PAYMENT_TIMEOUT_SECS,
                    asset: tag.token.asset.address.clone(),
                    extra: tag.token.extra(),
                })
            })
            .collect::<Result<Vec<_>, PaywallError>>()?;

        if requirements.is_empty() {
            return Err(PaywallError::NoRecipients);
        }
        Ok(Self { requirements })
    }

    pub fn requirements(&self) -> &[PaymentRequirements] {
        &self.requirements
    }

    pub fn payment_required(&self, error: impl Into<String>) -> PaymentRequiredResponse {
        PaymentRequiredResponse {
            x402_version: X402Version::V1,
            error: Some(error.into()),
            accepts: self.requirements.clone(),
        }
    }

    /// The advertised requirements the payload claims to satisfy
    pub fn requirements_for(&self, payload: &PaymentPayload) -> Result<&PaymentRequirements, PaywallError> {
        self.requirements
            .iter()
            .find(|req| req.network == payload.network && req.scheme == payload.scheme)
            .ok_or(PaywallError::UnsupportedNetwork(payload.network))
    }

    /// Check a payment with the facilitator; returns the matched requirements
    pub async fn verify<F: Facilitator>(
        &self,
        facilitator: &F,
        payload: &PaymentPayload,
    ) -> Result<PaymentRequirements, PaywallError> {
        let requirements = self.requirements_for(payload)?.clone();
        let request = VerifyRequest::new(payload.clone(), requirements.clone());
        let response = facilitator
            .verify(&request)
            .await
            .map_err(|e| PaywallError::Facilitator(e.to_string()))?;

        if !response.is_valid {
            let reason = response
                .invalid_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "rejected by facilitator".to_string());
            warn!(target: "x402-pay", payer = payload.payload.payer(), %reason, "Payment rejected");
            return Err(PaywallError::Invalid(reason));
        }

        info!(target: "x402-pay", payer = payload.payload.payer(), network = %payload.network, "Payment verified");
        Ok(requirements)
    }

    pub async fn settle<F: Facilitator>(
        &self,
        facilitator: &F,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, PaywallError> {
        let request = VerifyRequest::new(payload.clone(), requirements.clone());
        let response = facilitator
            .settle(&request)
            .await
            .map_err(|e| PaywallError::Facilitator(e.to_string()))?;

        if !response.success {
            let reason = response
                .error_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(PaywallError::Settlement(reason));
        }

        info!(
            target: "x402-pay",
            network = %response.network,
            transaction = response.transaction.as_deref().unwrap_or("-"),
            "Payment settled"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{EvmSigner, PaymentSigners, SvmSigner};
    use crate::x402::types::{SettleRequest, SettleResponse, TokenAmount, VerifyResponse};
    use alloy_primitives::U256;
    use std::sync::Mutex;

    fn recipients(testnet: bool) -> Recipients {
        Recipients {
            evm_pay_to: Some("0x2222222222222222222222222222222222222222".to_string()),
            solana_pay_to: Some(SvmSigner::random().address()),
            testnet,
        }
    }

    fn paywall(testnet: bool) -> Paywall {
        Paywall::new("0.05".parse().unwrap(), &recipients(testnet), "mcp://tool/x", "x").unwrap()
    }

    #[derive(Default)]
    struct FakeFacilitator {
        reject: bool,
        settled: Mutex<u32>,
    }

    impl Facilitator for FakeFacilitator {
        type Error = String;

        async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, String> {
            Ok(VerifyResponse {
                is_valid: !self.reject,
                payer: Some(MixedAddress::from(request.payment_payload.payload.payer())),
                invalid_reason: None,
            })
        }

        async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, String> {
            *self.settled.lock().unwrap() += 1;
            Ok(SettleResponse {
                success: true,
                error_reason: None,
                payer: None,
                transaction: Some("0xabc".to_string()),
                network: request.payment_requirements.network,
            })
        }
    }

    #[test]
    fn test_networks_follow_testnet_flag() {
        let networks: Vec<_> = paywall(true).requirements().iter().map(|r| r.network).collect();
        assert_eq!(networks, vec![Network::BaseSepolia, Network::SolanaDevnet]);

        let networks: Vec<_> = paywall(false).requirements().iter().map(|r| r.network).collect();
        assert_eq!(networks, vec![Network::Base, Network::Solana]);
    }

    #[test]
    fn test_requirement_fields() {
        let wall = paywall(false);
        let base = &wall.requirements()[0];
        assert_eq!(base.max_amount_required, TokenAmount(U256::from(50_000u64)));
        assert_eq!(base.asset.as_str(), "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
        assert_eq!(base.extra.as_ref().unwrap()["name"], "USD Coin");

        let solana = &wall.requirements()[1];
        assert!(solana.extra.is_none());
    }

    #[test]
    fn test_only_configured_recipients_are_advertised() {
        let only_evm = Recipients {
            evm_pay_to: Some("0x2222222222222222222222222222222222222222".to_string()),
            solana_pay_to: Some("  ".to_string()),
            testnet: false,
        };
        let wall = Paywall::new("0.05".parse().unwrap(), &only_evm, "r", "d").unwrap();
        assert_eq!(wall.requirements().len(), 1);

        assert!(matches!(
            Paywall::new("0.05".parse().unwrap(), &Recipients::default(), "r", "d"),
            Err(PaywallError::NoRecipients)
        ));
    }

    #[tokio::test]
    async fn test_verify_and_settle() {
        let wall = paywall(true);
        let signers = PaymentSigners::new(EvmSigner::random(), SvmSigner::random());
        let payload = wall.requirements()[1].sign(&signers).unwrap();
        let facilitator = FakeFacilitator::default();

        let matched = wall.verify(&facilitator, &payload).await.unwrap();
        assert_eq!(matched.network, Network::SolanaDevnet);

        let settled = wall.settle(&facilitator, &payload, &matched).await.unwrap();
        assert_eq!(settled.transaction.as_deref(), Some("0xabc"));
        assert_eq!(*facilitator.settled.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_verify_rejections() {
        let signers = PaymentSigners::new(EvmSigner::random(), SvmSigner::random());
        let mainnet_payload = paywall(false).requirements()[0].sign(&signers).unwrap();

        // Mainnet payment presented to a testnet paywall
        let facilitator = FakeFacilitator::default();
        assert!(matches!(
            paywall(true).verify(&facilitator, &mainnet_payload).await,
            Err(PaywallError::UnsupportedNetwork(Network::Base))
        ));

        let facilitator = FakeFacilitator {
            reject: true,
            ..Default::default()
        };
        assert!(matches!(
            paywall(false).verify(&facilitator, &mainnet_payload).await,
            Err(PaywallError::Invalid(_))
        ));
    }
}
