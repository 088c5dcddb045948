//! Token pool refill: blind a batch, have the server sign it, verify the
//! batch proof and bank the unblinded tokens.
//!
//! The exchange is two requests. The first submits the blinded batch and
//! returns a claim nonce; the second redeems the nonce for the signed batch.
//! A batch whose submission never reached the server is thrown away and
//! reblinded on retry, but once a nonce is held the same batch is kept so the
//! claim can be repeated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use challenge_bypass_ristretto::voprf::{BlindedToken, Token};
use confirmations_net::{HttpRequest, Transport};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::backoff::{retry_with_backoff, BackoffPolicy};
use crate::crypto::{self, TokenGenerator};
use crate::error::SdkError;
use crate::issuers::CatalogIssuers;
use crate::pool::{UnblindedTokenInfo, UnblindedTokens};
use crate::wallet::{build_signature_headers, WalletInfo};

/// Refill when the pool drops below this many tokens.
pub const MINIMUM_UNBLINDED_TOKENS: usize = 20;
/// Refill back up to this many tokens.
pub const MAXIMUM_UNBLINDED_TOKENS: usize = 50;

#[derive(Debug, PartialEq)]
pub enum RefillOutcome {
    /// This many tokens were added to the pool.
    Refilled(usize),
    /// The pool is above the low-water mark; nothing to do.
    PoolSufficient,
    /// Another refill is already running.
    AlreadyInFlight,
}

#[derive(Debug)]
pub struct RefillError {
    pub reason: SdkError,
    pub should_retry: bool,
}

impl RefillError {
    fn no_retry(reason: SdkError) -> Self {
        Self {
            reason,
            should_retry: false,
        }
    }

    fn retry(reason: SdkError) -> Self {
        Self {
            reason,
            should_retry: true,
        }
    }
}

struct OutstandingBatch {
    tokens: Vec<Token>,
    blinded_tokens: Vec<BlindedToken>,
    nonce: Option<String>,
}

pub struct RefillUnblindedTokens {
    transport: Arc<dyn Transport>,
    issuers: Arc<RwLock<CatalogIssuers>>,
    pool: Arc<UnblindedTokens>,
    generator: Arc<dyn TokenGenerator>,
    batch: Mutex<Option<OutstandingBatch>>,
    in_flight: AtomicBool,
    policy: BackoffPolicy,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RefillUnblindedTokens {
    pub fn new(
        transport: Arc<dyn Transport>,
        issuers: Arc<RwLock<CatalogIssuers>>,
        pool: Arc<UnblindedTokens>,
        generator: Arc<dyn TokenGenerator>,
    ) -> Self {
        Self {
            transport,
            issuers,
            pool,
            generator,
            batch: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            policy: BackoffPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Top the pool back up to the high-water mark if it has fallen below the
    /// low-water mark. Transient failures are retried internally with
    /// backoff; a terminal failure leaves the pool untouched.
    pub async fn maybe_refill(
        &self,
        wallet: &WalletInfo,
    ) -> std::result::Result<RefillOutcome, RefillError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Ok(RefillOutcome::AlreadyInFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        if !wallet.is_valid() {
            return Err(RefillError::no_retry(SdkError::InvalidWallet(
                "wallet cannot sign refill requests".to_string(),
            )));
        }
        let catalog = self.catalog()?;
        if !catalog.is_valid() {
            return Err(RefillError::no_retry(SdkError::UntrustedIssuer(
                "issuer catalog is empty".to_string(),
            )));
        }

        let count = self.pool.count().map_err(RefillError::no_retry)?;
        if count >= MINIMUM_UNBLINDED_TOKENS {
            return Ok(RefillOutcome::PoolSufficient);
        }
        let needed = MAXIMUM_UNBLINDED_TOKENS - count;

        let added = retry_with_backoff(
            &self.policy,
            |e: &RefillError| e.should_retry,
            || self.attempt_refill(wallet, &catalog, needed),
        )
        .await?;

        info!(added, "refilled token pool");
        Ok(RefillOutcome::Refilled(added))
    }

    fn catalog(&self) -> std::result::Result<CatalogIssuers, RefillError> {
        self.issuers
            .read()
            .map(|catalog| catalog.clone())
            .map_err(|e| {
                RefillError::retry(SdkError::State(format!("issuer catalog poisoned: {}", e)))
            })
    }

    async fn attempt_refill(
        &self,
        wallet: &WalletInfo,
        catalog: &CatalogIssuers,
        needed: usize,
    ) -> std::result::Result<usize, RefillError> {
        let mut batch = self.take_or_create_batch(needed)?;

        let nonce = match batch.nonce.clone() {
            Some(nonce) => nonce,
            // Submission failures discard the batch so the retry reblinds.
            None => {
                let nonce = self.request_signed_tokens(wallet, &batch).await?;
                batch.nonce = Some(nonce.clone());
                nonce
            }
        };

        match self.claim_signed_tokens(wallet, catalog, &batch, &nonce).await {
            Ok(unblinded) => {
                let added = unblinded.len();
                self.pool.add_all(unblinded).map_err(RefillError::retry)?;
                Ok(added)
            }
            Err(e) => {
                if e.should_retry && e.keep_batch {
                    self.put_batch_back(batch)?;
                }
                Err(e.into())
            }
        }
    }

    fn take_or_create_batch(
        &self,
        needed: usize,
    ) -> std::result::Result<OutstandingBatch, RefillError> {
        let mut slot = self.batch.lock().map_err(|e| {
            RefillError::retry(SdkError::State(format!("batch lock poisoned: {}", e)))
        })?;

        Ok(slot.take().unwrap_or_else(|| {
            let tokens = self.generator.generate(needed);
            let blinded_tokens = crypto::blind_all(&tokens);
            OutstandingBatch {
                tokens,
                blinded_tokens,
                nonce: None,
            }
        }))
    }

    fn put_batch_back(&self, batch: OutstandingBatch) -> std::result::Result<(), RefillError> {
        let mut slot = self.batch.lock().map_err(|e| {
            RefillError::retry(SdkError::State(format!("batch lock poisoned: {}", e)))
        })?;
        *slot = Some(batch);
        Ok(())
    }

    async fn request_signed_tokens(
        &self,
        wallet: &WalletInfo,
        batch: &OutstandingBatch,
    ) -> std::result::Result<String, RefillError> {
        let blinded: Vec<String> = batch
            .blinded_tokens
            .iter()
            .map(|b| b.encode_base64())
            .collect();
        let body = json!({ "blindedTokens": blinded }).to_string();
        let (digest, signature) =
            build_signature_headers(wallet, &body).map_err(RefillError::no_retry)?;

        let path = format!("/v3/confirmation/token/{}", wallet.payment_id);
        let request = HttpRequest::post(&path, body)
            .with_header("digest", &digest)
            .with_header("signature", &signature)
            .with_header("accept", "application/json")
            .with_header("content-type", "application/json");

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "token submission failed, discarding batch");
                return Err(RefillError::retry(e.into()));
            }
        };

        match response.status {
            201 => {
                let body: Value = serde_json::from_str(&response.body).map_err(|e| {
                    RefillError::no_retry(SdkError::InvalidResponse(format!(
                        "malformed nonce response: {}",
                        e
                    )))
                })?;
                body["nonce"]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        RefillError::no_retry(SdkError::InvalidResponse(
                            "missing nonce".to_string(),
                        ))
                    })
            }
            status if (500..600).contains(&status) => Err(RefillError::retry(
                SdkError::InvalidResponse(format!("token submission failed with HTTP {}", status)),
            )),
            status => Err(RefillError::no_retry(SdkError::InvalidResponse(format!(
                "token submission rejected with HTTP {}",
                status
            )))),
        }
    }

    async fn claim_signed_tokens(
        &self,
        wallet: &WalletInfo,
        catalog: &CatalogIssuers,
        batch: &OutstandingBatch,
        nonce: &str,
    ) -> std::result::Result<Vec<UnblindedTokenInfo>, ClaimError> {
        let path = format!(
            "/v3/confirmation/token/{}?nonce={}",
            wallet.payment_id, nonce
        );
        let request = HttpRequest::get(&path).with_header("accept", "application/json");

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            // The nonce stays valid; keep the batch and claim again.
            Err(e) => return Err(ClaimError::transient(e.into())),
        };

        match response.status {
            200 => {}
            status if (500..600).contains(&status) => {
                return Err(ClaimError::transient(SdkError::InvalidResponse(format!(
                    "token claim failed with HTTP {}",
                    status
                ))))
            }
            status => {
                return Err(ClaimError::fatal(SdkError::InvalidResponse(format!(
                    "token claim rejected with HTTP {}",
                    status
                ))))
            }
        }

        let body: Value = serde_json::from_str(&response.body).map_err(|e| {
            ClaimError::fatal(SdkError::InvalidResponse(format!(
                "malformed signed token response: {}",
                e
            )))
        })?;

        let public_key_base64 = body["publicKey"]
            .as_str()
            .ok_or_else(|| ClaimError::fatal(SdkError::InvalidResponse("missing publicKey".to_string())))?;
        if public_key_base64 != catalog.confirmations_public_key {
            return Err(ClaimError::fatal(SdkError::UntrustedIssuer(
                public_key_base64.to_string(),
            )));
        }
        let public_key = crypto::decode_public_key(public_key_base64).map_err(ClaimError::fatal)?;

        let batch_proof = body["batchProof"]
            .as_str()
            .ok_or_else(|| ClaimError::fatal(SdkError::InvalidResponse("missing batchProof".to_string())))?;
        let proof = crypto::decode_batch_proof(batch_proof).map_err(ClaimError::fatal)?;

        let signed_values: Vec<String> = body["signedTokens"]
            .as_array()
            .ok_or_else(|| ClaimError::fatal(SdkError::InvalidResponse("missing signedTokens".to_string())))?
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    ClaimError::fatal(SdkError::InvalidResponse(
                        "non-string signed token".to_string(),
                    ))
                })
            })
            .collect::<std::result::Result<_, _>>()?;
        let signed_tokens = crypto::decode_signed_tokens(&signed_values).map_err(ClaimError::fatal)?;

        // All-or-nothing: a bad proof taints the whole batch, so it is
        // discarded and the retry starts over with fresh tokens.
        let unblinded = crypto::verify_and_unblind(
            &proof,
            &batch.tokens,
            &batch.blinded_tokens,
            &signed_tokens,
            &public_key,
        )
        .map_err(|e| {
            warn!("batch proof verification failed, discarding batch");
            ClaimError::retry_fresh(e)
        })?;

        Ok(unblinded
            .iter()
            .map(|u| UnblindedTokenInfo::new(u, &public_key))
            .collect())
    }
}

/// Claim-step failure: transient failures keep the batch and nonce, a failed
/// proof retries with a fresh batch, everything else is terminal.
struct ClaimError {
    reason: SdkError,
    should_retry: bool,
    keep_batch: bool,
}

impl ClaimError {
    fn transient(reason: SdkError) -> Self {
        Self {
            reason,
            should_retry: true,
            keep_batch: true,
        }
    }

    fn retry_fresh(reason: SdkError) -> Self {
        Self {
            reason,
            should_retry: true,
            keep_batch: false,
        }
    }

    fn fatal(reason: SdkError) -> Self {
        Self {
            reason,
            should_retry: false,
            keep_batch: false,
        }
    }
}

impl From<ClaimError> for RefillError {
    fn from(e: ClaimError) -> Self {
        Self {
            reason: e.reason,
            should_retry: e.should_retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use confirmations_net::transport::testing::StaticResponses;
    use confirmations_net::Method;
    use serde_json::json;

    use super::*;
    use crate::crypto::{FixedTokenGenerator, RandomTokenGenerator};
    use crate::issuers::PaymentIssuer;
    use crate::state::MemoryStore;
    use crate::test_util::Issuer;
    use crate::wallet::tests::test_wallet;

    const NONCE: &str = "2f0e2891-e7a5-4262-835b-550b13e58e5c";

    struct Fixture {
        transport: Arc<StaticResponses>,
        pool: Arc<UnblindedTokens>,
        engine: RefillUnblindedTokens,
        wallet: WalletInfo,
        issuer: Issuer,
        token_base64: Vec<String>,
    }

    impl Fixture {
        fn new() -> Self {
            let issuer = Issuer::new();
            let catalog = CatalogIssuers::new(
                &issuer.public_key_base64(),
                vec![PaymentIssuer {
                    name: "0.25BAT".to_string(),
                    public_key: Issuer::new().public_key_base64(),
                }],
            );

            // Fixed tokens so every regenerated batch blinds identically.
            let token_base64: Vec<String> = RandomTokenGenerator
                .generate(MAXIMUM_UNBLINDED_TOKENS)
                .iter()
                .map(|t| t.encode_base64())
                .collect();

            let transport = Arc::new(StaticResponses::new());
            let pool = Arc::new(UnblindedTokens::new(Arc::new(MemoryStore::new())));
            let engine = RefillUnblindedTokens::new(
                transport.clone(),
                Arc::new(RwLock::new(catalog)),
                pool.clone(),
                Arc::new(FixedTokenGenerator::new(token_base64.clone())),
            )
            .with_policy(BackoffPolicy {
                jitter: 0.0,
                max_attempts: Some(3),
                ..BackoffPolicy::default()
            });

            Self {
                transport,
                pool,
                engine,
                wallet: test_wallet(),
                issuer,
                token_base64,
            }
        }

        fn submit_path(&self) -> String {
            format!("/v3/confirmation/token/{}", self.wallet.payment_id)
        }

        fn claim_path(&self) -> String {
            format!(
                "/v3/confirmation/token/{}?nonce={}",
                self.wallet.payment_id, NONCE
            )
        }

        /// Signed token body for the first `count` fixed tokens.
        fn signed_body(&self, count: usize) -> String {
            let blinded: Vec<String> = self.token_base64[..count]
                .iter()
                .map(|s| {
                    crypto::decode_token(s).unwrap().blind().encode_base64()
                })
                .collect();
            let (proof, signed) = self.issuer.sign_and_prove(&blinded);
            json!({
                "publicKey": self.issuer.public_key_base64(),
                "batchProof": proof,
                "signedTokens": signed,
            })
            .to_string()
        }

        fn nonce_body() -> String {
            json!({ "nonce": NONCE }).to_string()
        }

        fn posts(&self) -> usize {
            self.transport
                .requests()
                .iter()
                .filter(|r| r.method == Method::Post)
                .count()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fills_empty_pool_to_the_high_water_mark() {
        let fixture = Fixture::new();
        fixture
            .transport
            .insert(&fixture.submit_path(), 201, &Fixture::nonce_body());
        fixture.transport.insert(
            &fixture.claim_path(),
            200,
            &fixture.signed_body(MAXIMUM_UNBLINDED_TOKENS),
        );

        let outcome = fixture.engine.maybe_refill(&fixture.wallet).await.unwrap();

        assert_eq!(
            outcome,
            RefillOutcome::Refilled(MAXIMUM_UNBLINDED_TOKENS)
        );
        assert_eq!(fixture.pool.count().unwrap(), MAXIMUM_UNBLINDED_TOKENS);

        let submit = &fixture.transport.requests()[0];
        assert!(submit.headers.iter().any(|(name, _)| name == "digest"));
        assert!(submit.headers.iter().any(|(name, _)| name == "signature"));
    }

    #[tokio::test(start_paused = true)]
    async fn tops_up_only_the_shortfall() {
        let fixture = Fixture::new();
        let other = Issuer::new();
        fixture.pool.add_all(other.issue_unblinded(19)).unwrap();

        fixture
            .transport
            .insert(&fixture.submit_path(), 201, &Fixture::nonce_body());
        fixture
            .transport
            .insert(&fixture.claim_path(), 200, &fixture.signed_body(31));

        let outcome = fixture.engine.maybe_refill(&fixture.wallet).await.unwrap();

        assert_eq!(outcome, RefillOutcome::Refilled(31));
        assert_eq!(fixture.pool.count().unwrap(), MAXIMUM_UNBLINDED_TOKENS);
    }

    #[tokio::test(start_paused = true)]
    async fn sufficient_pool_makes_no_requests() {
        let fixture = Fixture::new();
        let other = Issuer::new();
        fixture
            .pool
            .add_all(other.issue_unblinded(MINIMUM_UNBLINDED_TOKENS))
            .unwrap();

        let outcome = fixture.engine.maybe_refill(&fixture.wallet).await.unwrap();

        assert_eq!(outcome, RefillOutcome::PoolSufficient);
        assert!(fixture.transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_wallet_is_terminal() {
        let fixture = Fixture::new();
        let err = fixture
            .engine
            .maybe_refill(&WalletInfo::default())
            .await
            .unwrap_err();

        assert!(!err.should_retry);
        assert!(matches!(err.reason, SdkError::InvalidWallet(_)));
        assert!(fixture.transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_issuer_catalog_is_terminal() {
        let fixture = Fixture::new();
        let engine = RefillUnblindedTokens::new(
            fixture.transport.clone(),
            Arc::new(RwLock::new(CatalogIssuers::default())),
            fixture.pool.clone(),
            Arc::new(RandomTokenGenerator),
        );

        let err = engine.maybe_refill(&fixture.wallet).await.unwrap_err();
        assert!(!err.should_retry);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submission_reblinds_and_retries() {
        let fixture = Fixture::new();
        fixture.transport.insert(&fixture.submit_path(), 500, "");
        fixture
            .transport
            .insert(&fixture.submit_path(), 201, &Fixture::nonce_body());
        fixture.transport.insert(
            &fixture.claim_path(),
            200,
            &fixture.signed_body(MAXIMUM_UNBLINDED_TOKENS),
        );

        let outcome = fixture.engine.maybe_refill(&fixture.wallet).await.unwrap();

        assert_eq!(
            outcome,
            RefillOutcome::Refilled(MAXIMUM_UNBLINDED_TOKENS)
        );
        assert_eq!(fixture.posts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_claim_keeps_the_nonce() {
        let fixture = Fixture::new();
        fixture
            .transport
            .insert(&fixture.submit_path(), 201, &Fixture::nonce_body());
        fixture.transport.insert(&fixture.claim_path(), 500, "");
        fixture.transport.insert(
            &fixture.claim_path(),
            200,
            &fixture.signed_body(MAXIMUM_UNBLINDED_TOKENS),
        );

        let outcome = fixture.engine.maybe_refill(&fixture.wallet).await.unwrap();

        assert_eq!(
            outcome,
            RefillOutcome::Refilled(MAXIMUM_UNBLINDED_TOKENS)
        );
        // Submitted once, claimed twice.
        assert_eq!(fixture.posts(), 1);
        assert_eq!(fixture.transport.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_nonce_is_terminal() {
        let fixture = Fixture::new();
        fixture.transport.insert(&fixture.submit_path(), 201, "{}");

        let err = fixture.engine.maybe_refill(&fixture.wallet).await.unwrap_err();
        assert!(!err.should_retry);
        assert_eq!(fixture.pool.count().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_public_key_is_terminal() {
        let fixture = Fixture::new();
        fixture
            .transport
            .insert(&fixture.submit_path(), 201, &Fixture::nonce_body());

        let rogue = Issuer::new();
        let blinded: Vec<String> = fixture.token_base64[..MAXIMUM_UNBLINDED_TOKENS]
            .iter()
            .map(|s| crypto::decode_token(s).unwrap().blind().encode_base64())
            .collect();
        let (proof, signed) = rogue.sign_and_prove(&blinded);
        let body = json!({
            "publicKey": rogue.public_key_base64(),
            "batchProof": proof,
            "signedTokens": signed,
        })
        .to_string();
        fixture.transport.insert(&fixture.claim_path(), 200, &body);

        let err = fixture.engine.maybe_refill(&fixture.wallet).await.unwrap_err();
        assert!(!err.should_retry);
        assert!(matches!(err.reason, SdkError::UntrustedIssuer(_)));
        assert_eq!(fixture.pool.count().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_proof_restarts_with_a_fresh_batch() {
        let fixture = Fixture::new();
        fixture
            .transport
            .insert(&fixture.submit_path(), 201, &Fixture::nonce_body());
        fixture
            .transport
            .insert(&fixture.submit_path(), 201, &Fixture::nonce_body());

        // Proof over someone else's tokens fails verification.
        let other_blinded: Vec<String> = RandomTokenGenerator
            .generate(MAXIMUM_UNBLINDED_TOKENS)
            .iter()
            .map(|t| t.blind().encode_base64())
            .collect();
        let (proof, signed) = fixture.issuer.sign_and_prove(&other_blinded);
        let bad_body = json!({
            "publicKey": fixture.issuer.public_key_base64(),
            "batchProof": proof,
            "signedTokens": signed,
        })
        .to_string();
        fixture.transport.insert(&fixture.claim_path(), 200, &bad_body);
        fixture.transport.insert(
            &fixture.claim_path(),
            200,
            &fixture.signed_body(MAXIMUM_UNBLINDED_TOKENS),
        );

        let outcome = fixture.engine.maybe_refill(&fixture.wallet).await.unwrap();

        assert_eq!(
            outcome,
            RefillOutcome::Refilled(MAXIMUM_UNBLINDED_TOKENS)
        );
        // The batch was resubmitted after the proof failure.
        assert_eq!(fixture.posts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_a_proof_failure_never_reuses_blinded_tokens() {
        let fixture = Fixture::new();
        let catalog = CatalogIssuers::new(
            &fixture.issuer.public_key_base64(),
            vec![PaymentIssuer {
                name: "0.25BAT".to_string(),
                public_key: Issuer::new().public_key_base64(),
            }],
        );
        // Truly random tokens per attempt, unlike the fixed fixture batch.
        let engine = RefillUnblindedTokens::new(
            fixture.transport.clone(),
            Arc::new(RwLock::new(catalog)),
            fixture.pool.clone(),
            Arc::new(RandomTokenGenerator),
        )
        .with_policy(BackoffPolicy {
            jitter: 0.0,
            max_attempts: Some(1),
            ..BackoffPolicy::default()
        });

        fixture
            .transport
            .insert(&fixture.submit_path(), 201, &Fixture::nonce_body());

        // A proof over unrelated tokens fails verification for any batch.
        let other_blinded: Vec<String> = RandomTokenGenerator
            .generate(MAXIMUM_UNBLINDED_TOKENS)
            .iter()
            .map(|t| t.blind().encode_base64())
            .collect();
        let (proof, signed) = fixture.issuer.sign_and_prove(&other_blinded);
        let bad_body = json!({
            "publicKey": fixture.issuer.public_key_base64(),
            "batchProof": proof,
            "signedTokens": signed,
        })
        .to_string();
        fixture.transport.insert(&fixture.claim_path(), 200, &bad_body);

        let err = engine.maybe_refill(&fixture.wallet).await.unwrap_err();
        assert!(err.should_retry);
        assert_eq!(fixture.pool.count().unwrap(), 0);

        let submissions: Vec<Vec<String>> = fixture
            .transport
            .requests()
            .iter()
            .filter(|r| r.method == Method::Post)
            .map(|r| {
                let body: Value = serde_json::from_str(r.body.as_ref().unwrap()).unwrap();
                body["blindedTokens"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|v| v.as_str().unwrap().to_string())
                    .collect()
            })
            .collect();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[1].len(), MAXIMUM_UNBLINDED_TOKENS);
        assert!(submissions[1]
            .iter()
            .all(|blinded| !submissions[0].contains(blinded)));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_attempt_budget_and_banks_nothing() {
        let fixture = Fixture::new();
        fixture
            .transport
            .insert(&fixture.submit_path(), 201, &Fixture::nonce_body());
        fixture.transport.insert(&fixture.claim_path(), 500, "");

        let err = fixture.engine.maybe_refill(&fixture.wallet).await.unwrap_err();
        assert!(err.should_retry);
        assert_eq!(fixture.pool.count().unwrap(), 0);
    }
}
