//! Settlement networks the payment layer can sign for
//!
//! Two families are supported: EVM chains (EIP-3009 USDC authorizations) and
//! the Solana virtual machine. Every network carries its family so callers can
//! route a payment requirement to the matching signer.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Which signer family a network settles with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkFamily {
    Evm,
    Svm,
}

impl Display for NetworkFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkFamily::Evm => write!(f, "evm"),
            NetworkFamily::Svm => write!(f, "svm"),
        }
    }
}

/// Metadata for a settlement network
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    /// The canonical network identifier
    pub network: Network,
    /// Signer family
    pub family: NetworkFamily,
    /// EVM chain ID (None for non-EVM networks)
    pub chain_id: Option<u64>,
    /// Whether this is a testnet
    pub is_testnet: bool,
    /// All valid names/aliases (first is canonical, used for Display and serde)
    pub names: &'static [&'static str],
}

// Syntax: VariantName => (family, chain_id, is_testnet, [names...])
macro_rules! define_networks {
    ($(
        $variant:ident => ($family:ident, $chain_id:expr, $is_testnet:expr, [$first_name:expr $(, $other_names:expr)* $(,)?])
    ),+ $(,)?) => {
        paste::paste! {
            /// Networks a payment can settle on
            #[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
            pub enum Network {
                $(
                    #[serde(rename = $first_name)]
                    $variant,
                )+
            }

            $(
                const [<$variant:upper _INFO>]: NetworkInfo = NetworkInfo {
                    network: Network::$variant,
                    family: NetworkFamily::$family,
                    chain_id: $chain_id,
                    is_testnet: $is_testnet,
                    names: &[$first_name $(, $other_names)*],
                };
            )+

            const NETWORK_REGISTRY: &[NetworkInfo] = &[
                $( [<$variant:upper _INFO>] ),+
            ];

            pub const ALL_NETWORKS: &[Network] = &[
                $( Network::$variant ),+
            ];

            impl Network {
                pub fn info(&self) -> &'static NetworkInfo {
                    match self {
                        $( Network::$variant => &[<$variant:upper _INFO>] ),+
                    }
                }

                pub fn variants() -> &'static [Network] {
                    ALL_NETWORKS
                }
            }
        }
    };
}

define_networks! {
    Base          => (Evm, Some(8453),  false, ["base", "Base"]),
    BaseSepolia   => (Evm, Some(84532), true,  ["base-sepolia", "BaseSepolia"]),
    Solana        => (Svm, None,        false, ["solana", "Solana", "solana-mainnet"]),
    SolanaDevnet  => (Svm, None,        true,  ["solana-devnet", "SolanaDevnet"]),
}

impl Network {
    pub fn family(&self) -> NetworkFamily {
        self.info().family
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.info().chain_id
    }

    pub fn name(&self) -> &'static str {
        self.info().names[0]
    }

    pub fn is_testnet(&self) -> bool {
        self.info().is_testnet
    }

    /// Parse a network name (any alias, case-insensitive)
    pub fn parse(s: &str) -> Option<Network> {
        let s_lower = s.to_lowercase();
        NETWORK_REGISTRY.iter().find_map(|info| {
            info.names
                .iter()
                .any(|name| name.to_lowercase() == s_lower)
                .then_some(info.network)
        })
    }

    /// The network of `family` matching the deployment mode
    pub fn for_family(family: NetworkFamily, testnet: bool) -> Network {
        match (family, testnet) {
            (NetworkFamily::Evm, false) => Network::Base,
            (NetworkFamily::Evm, true) => Network::BaseSepolia,
            (NetworkFamily::Svm, false) => Network::Solana,
            (NetworkFamily::Svm, true) => Network::SolanaDevnet,
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_network() {
        assert_eq!(Network::parse("base"), Some(Network::Base));
        assert_eq!(Network::parse("BaseSepolia"), Some(Network::BaseSepolia));
        assert_eq!(Network::parse("SOLANA-DEVNET"), Some(Network::SolanaDevnet));
        assert!(Network::parse("polygon").is_none());
    }

    #[test]
    fn test_family_and_chain_id() {
        assert_eq!(Network::Base.family(), NetworkFamily::Evm);
        assert_eq!(Network::Base.chain_id(), Some(8453));
        assert_eq!(Network::Solana.family(), NetworkFamily::Svm);
        assert_eq!(Network::Solana.chain_id(), None);
    }

    #[test]
    fn test_for_family() {
        assert_eq!(Network::for_family(NetworkFamily::Evm, true), Network::BaseSepolia);
        assert_eq!(Network::for_family(NetworkFamily::Svm, false), Network::Solana);
        assert!(Network::for_family(NetworkFamily::Svm, true).is_testnet());
    }

    #[test]
    fn test_serde_uses_canonical_name() {
        let json = serde_json::to_string(&Network::SolanaDevnet).unwrap();
        assert_eq!(json, "\"solana-devnet\"");
        let parsed: Network = serde_json::from_str("\"base-sepolia\"").unwrap();
        assert_eq!(parsed, Network::BaseSepolia);
    }
}
