//! Choosing which offered payment option to pay with

use crate::chain::{Network, PaymentSigners};

use super::types::PaymentRequirements;

/// Callback the payment layer uses to pick one of the offered requirements
pub type SelectRequirement = fn(&[PaymentRequirements], &PaymentSigners) -> Option<PaymentRequirements>;

/// Lower rank wins
const NETWORK_PRIORITY: &[(Network, u8)] = &[
    (Network::Base, 0),
    (Network::BaseSepolia, 1),
    (Network::Solana, 2),
    (Network::SolanaDevnet, 3),
];

fn rank(network: Network) -> u8 {
    NETWORK_PRIORITY
        .iter()
        .find_map(|(n, rank)| (*n == network).then_some(*rank))
        .unwrap_or(u8::MAX)
}

/// Pick the best-ranked requirement we hold a signer for.
///
/// Ties keep the server's offer order. Returns None when no offered network
/// has a matching signer.
pub fn select_requirement(
    accepts: &[PaymentRequirements],
    signers: &PaymentSigners,
) -> Option<PaymentRequirements> {
    accepts
        .iter()
        .filter(|req| signers.supports(req.network.family()))
        .min_by_key(|req| rank(req.network))
        .cloned()
}
