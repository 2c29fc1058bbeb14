//! Payment identities and the networks they settle on

pub mod network;
pub use network::{ALL_NETWORKS, Network, NetworkFamily};

pub mod evm;
pub use evm::{Eip712Domain, EvmSigner, TransferWithAuthorization};

pub mod svm;
pub use svm::{SvmSigner, SvmTransferAuthorization};

pub mod usdc;
pub use usdc::USDC;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Invalid {0} encoding")]
    InvalidEncoding(&'static str),
    #[error("Invalid private key")]
    InvalidKey,
    #[error("Signing failed")]
    SigningFailed,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// One signer per network family
///
/// Either side may be absent; requirements on a family without a signer are
/// never selected.
#[derive(Debug, Clone, Default)]
pub struct PaymentSigners {
    pub evm: Option<EvmSigner>,
    pub svm: Option<SvmSigner>,
}

impl PaymentSigners {
    pub fn new(evm: EvmSigner, svm: SvmSigner) -> Self {
        Self {
            evm: Some(evm),
            svm: Some(svm),
        }
    }

    /// Build both signers from their secrets
    pub fn from_secrets(evm_secret: &str, svm_secret: &str) -> Result<Self, SignerError> {
        Ok(Self::new(
            EvmSigner::from_hex(evm_secret)?,
            SvmSigner::from_secret(svm_secret)?,
        ))
    }

    pub fn supports(&self, family: NetworkFamily) -> bool {
        match family {
            NetworkFamily::Evm => self.evm.is_some(),
            NetworkFamily::Svm => self.svm.is_some(),
        }
    }

    /// The payer address on `family`, if a signer is configured
    pub fn address(&self, family: NetworkFamily) -> Option<String> {
        match family {
            NetworkFamily::Evm => self.evm.as_ref().map(|s| s.address().to_string()),
            NetworkFamily::Svm => self.svm.as_ref().map(|s| s.address()),
        }
    }
}
