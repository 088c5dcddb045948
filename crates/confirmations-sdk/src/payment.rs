//! Pool of earned payment tokens awaiting payout.

use std::sync::{Arc, Mutex, MutexGuard};

use challenge_bypass_ristretto::voprf::UnblindedToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confirmation::ConfirmationType;
use crate::crypto;
use crate::error::{Result, SdkError};
use crate::state::StateStore;

const STATE_KEY: &str = "payment_tokens";

/// A payment token earned by redeeming a confirmation, with the issuer key
/// it was signed under and when it was earned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentTokenInfo {
    pub unblinded_token: String,
    pub public_key: String,
    pub confirmation_type: ConfirmationType,
    pub redeemed_at: DateTime<Utc>,
}

impl PaymentTokenInfo {
    pub fn token(&self) -> Result<UnblindedToken> {
        crypto::decode_unblinded_token(&self.unblinded_token)
    }
}

pub struct PaymentTokens {
    tokens: Mutex<Vec<PaymentTokenInfo>>,
    store: Arc<dyn StateStore>,
}

impl PaymentTokens {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            tokens: Mutex::new(Vec::new()),
            store,
        }
    }

    pub fn load(store: Arc<dyn StateStore>) -> Result<Self> {
        let pool = Self::new(store);
        if let Some(json) = pool.store.load(STATE_KEY)? {
            let imported: Vec<PaymentTokenInfo> = serde_json::from_str(&json)?;
            *pool.lock()? = imported;
        }
        Ok(pool)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<PaymentTokenInfo>>> {
        self.tokens
            .lock()
            .map_err(|e| SdkError::State(format!("payment pool lock poisoned: {}", e)))
    }

    fn persist(&self, tokens: &[PaymentTokenInfo]) -> Result<()> {
        self.store.save(STATE_KEY, &serde_json::to_string(tokens)?)
    }

    pub fn add(&self, info: PaymentTokenInfo) -> Result<()> {
        let mut tokens = self.lock()?;
        tokens.push(info);
        self.persist(&tokens)
    }

    /// Snapshot of the pool, oldest first.
    pub fn all(&self) -> Result<Vec<PaymentTokenInfo>> {
        Ok(self.lock()?.clone())
    }

    /// Remove the given tokens after a successful payout. Tokens not present
    /// are skipped.
    pub fn remove_many(&self, redeemed: &[PaymentTokenInfo]) -> Result<()> {
        let mut tokens = self.lock()?;
        tokens.retain(|t| !redeemed.contains(t));
        self.persist(&tokens)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }
}
