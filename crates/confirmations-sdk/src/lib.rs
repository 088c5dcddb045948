//! Client engine for an anonymous confirmations protocol built on blinded
//! tokens.
//!
//! The flow has three stages, each with its own engine:
//!
//! 1. [`RefillUnblindedTokens`] keeps a pool of spendable tokens topped up by
//!    submitting blinded batches for the server to sign and verifying the
//!    returned batch proof.
//! 2. [`RedeemConfirmation`] spends one pool token per ad event: it creates a
//!    confirmation on the server, then fetches the signed payment token the
//!    event earned.
//! 3. [`PayoutScheduler`] periodically redeems the accumulated payment
//!    tokens against the wallet's payment id.
//!
//! All server traffic goes through the [`Transport`] trait from
//! `confirmations-net`, so every engine can be driven against canned
//! responses in tests.

pub mod backoff;
pub mod confirmation;
pub mod crypto;
pub mod error;
pub mod issuers;
pub mod payment;
pub mod payout;
pub mod pool;
pub mod redeem;
pub mod refill;
pub mod state;
pub mod wallet;

#[cfg(test)]
mod test_util;

pub use backoff::{BackoffPolicy, BackoffTimer, ScheduledTask};
pub use confirmation::{BuildInfo, Confirmation, ConfirmationType};
pub use confirmations_net::Transport;
pub use error::{Result, SdkError};
pub use issuers::{CatalogIssuers, PaymentIssuer};
pub use payment::{PaymentTokenInfo, PaymentTokens};
pub use payout::{PayoutScheduler, RedeemPaymentTokens};
pub use pool::{UnblindedTokenInfo, UnblindedTokens};
pub use redeem::{RedeemConfirmation, Redemption};
pub use refill::{
    RefillOutcome, RefillUnblindedTokens, MAXIMUM_UNBLINDED_TOKENS, MINIMUM_UNBLINDED_TOKENS,
};
pub use state::{FileStore, MemoryStore, StateStore};
pub use wallet::WalletInfo;
