use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::x402::types::{MixedAddress, TokenAsset, TokenDeployment, TokenDeploymentEip712};

use super::{Network, NetworkFamily};

fn create_usdc(network: Network, address: &str) -> USDC {
    // EIP-712 domain only exists for the EVM deployments. Testnets use "USDC"
    // for the domain name, mainnets use "USD Coin".
    let eip712 = (network.family() == NetworkFamily::Evm).then(|| TokenDeploymentEip712 {
        name: if network.is_testnet() { "USDC" } else { "USD Coin" }.into(),
        version: "2".into(),
    });

    USDC(TokenDeployment {
        asset: TokenAsset {
            address: MixedAddress::from(address),
            network,
        },
        decimals: 6,
        eip712,
    })
}

// ============================================================================
// Known USDC Deployments
// ============================================================================

const DEPLOYMENTS: &[(Network, &str)] = &[
    (Network::Base, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
    (Network::BaseSepolia, "0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
    (Network::Solana, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
    (Network::SolanaDevnet, "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"),
];

static USDC_BY_NETWORK: Lazy<HashMap<Network, USDC>> = Lazy::new(|| {
    DEPLOYMENTS
        .iter()
        .map(|(network, addr)| (*network, create_usdc(*network, addr)))
        .collect()
});

/// A known USDC deployment as a wrapper around [`TokenDeployment`].
#[derive(Clone, Debug)]
pub struct USDC(pub TokenDeployment);

impl USDC {
    /// Returns None if USDC is not deployed on the network.
    pub fn try_by_network(network: Network) -> Option<&'static Self> {
        USDC_BY_NETWORK.get(&network)
    }

    pub fn supported_networks() -> Vec<Network> {
        Network::variants()
            .iter()
            .copied()
            .filter(|&network| Self::try_by_network(network).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_network_has_usdc() {
        assert_eq!(USDC::supported_networks(), Network::variants().to_vec());
    }

    #[test]
    fn test_eip712_domain_names() {
        let base = USDC::try_by_network(Network::Base).unwrap();
        assert_eq!(base.0.eip712.as_ref().unwrap().name, "USD Coin");

        let sepolia = USDC::try_by_network(Network::BaseSepolia).unwrap();
        assert_eq!(sepolia.0.eip712.as_ref().unwrap().name, "USDC");

        let solana = USDC::try_by_network(Network::Solana).unwrap();
        assert!(solana.0.eip712.is_none());
        assert_eq!(solana.0.decimals, 6);
    }
}
