//! Pool of spendable unblinded tokens.
//!
//! Tokens enter after a successful refill and leave exactly once, when a
//! confirmation claims one. Every mutation writes through to the state store
//! before it is observable, so a crash never revives a spent token.

use std::sync::{Arc, Mutex, MutexGuard};

use challenge_bypass_ristretto::voprf::{PublicKey, UnblindedToken};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crypto;
use crate::error::{Result, SdkError};
use crate::state::StateStore;

const STATE_KEY: &str = "unblinded_tokens";

/// An unblinded token together with the issuer key it was signed under,
/// both in base64 wire form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnblindedTokenInfo {
    pub unblinded_token: String,
    pub public_key: String,
}

impl UnblindedTokenInfo {
    pub fn new(unblinded_token: &UnblindedToken, public_key: &PublicKey) -> Self {
        Self {
            unblinded_token: unblinded_token.encode_base64(),
            public_key: public_key.encode_base64(),
        }
    }

    pub fn token(&self) -> Result<UnblindedToken> {
        crypto::decode_unblinded_token(&self.unblinded_token)
    }

    pub fn issuer_public_key(&self) -> Result<PublicKey> {
        crypto::decode_public_key(&self.public_key)
    }
}

pub struct UnblindedTokens {
    tokens: Mutex<Vec<UnblindedTokenInfo>>,
    store: Arc<dyn StateStore>,
}

impl UnblindedTokens {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            tokens: Mutex::new(Vec::new()),
            store,
        }
    }

    /// Pool seeded from whatever the store holds under this pool's key.
    pub fn load(store: Arc<dyn StateStore>) -> Result<Self> {
        let pool = Self::new(store);
        if let Some(json) = pool.store.load(STATE_KEY)? {
            pool.import_state(&json)?;
        }
        Ok(pool)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<UnblindedTokenInfo>>> {
        self.tokens
            .lock()
            .map_err(|e| SdkError::State(format!("token pool lock poisoned: {}", e)))
    }

    fn persist(&self, tokens: &[UnblindedTokenInfo]) -> Result<()> {
        self.store.save(STATE_KEY, &serde_json::to_string(tokens)?)
    }

    /// Remove and return the oldest token. The removal is persisted before
    /// the token is handed out.
    pub fn take(&self) -> Result<UnblindedTokenInfo> {
        let mut tokens = self.lock()?;
        if tokens.is_empty() {
            return Err(SdkError::EmptyPool);
        }
        let info = tokens.remove(0);
        self.persist(&tokens)?;
        Ok(info)
    }

    pub fn add_all(&self, new_tokens: Vec<UnblindedTokenInfo>) -> Result<()> {
        let mut tokens = self.lock()?;
        tokens.extend(new_tokens);
        self.persist(&tokens)
    }

    /// Remove a specific token. Returns whether it was present; removing an
    /// already-absent token is not an error.
    pub fn remove(&self, info: &UnblindedTokenInfo) -> Result<bool> {
        let mut tokens = self.lock()?;
        let before = tokens.len();
        tokens.retain(|t| t != info);
        let removed = tokens.len() != before;
        if removed {
            self.persist(&tokens)?;
        } else {
            warn!("token not found in pool, nothing removed");
        }
        Ok(removed)
    }

    pub fn remove_all(&self) -> Result<()> {
        let mut tokens = self.lock()?;
        tokens.clear();
        self.persist(&tokens)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    pub fn contains(&self, info: &UnblindedTokenInfo) -> Result<bool> {
        Ok(self.lock()?.iter().any(|t| t == info))
    }

    pub fn export_state(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.lock()?)?)
    }

    pub fn import_state(&self, json: &str) -> Result<()> {
        let imported: Vec<UnblindedTokenInfo> = serde_json::from_str(json)?;
        let mut tokens = self.lock()?;
        *tokens = imported;
        self.persist(&tokens)
    }
}
