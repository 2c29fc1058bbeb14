//! x402 payment protocol: wire types, payer-side selection and the
//! payee-side paywall backed by a remote facilitator

pub mod facilitator;
pub mod paywall;
pub mod select;
pub mod timestamp;
pub mod types;

pub use facilitator::{Facilitator, FacilitatorClient, FacilitatorClientError};
pub use paywall::{Paywall, PaywallError, Recipients};
pub use select::{SelectRequirement, select_requirement};
pub use timestamp::UnixTimestamp;
pub use types::{
    MixedAddress, MoneyAmount, PaymentPayload, PaymentRequiredResponse, PaymentRequirements,
    PaymentSignError,
};
