//! Whole-balance payout: redeem every banked payment token against the
//! wallet's payment id on a jittered recurring schedule.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use confirmations_net::{HttpRequest, Transport};
use serde_json::json;
use tracing::{info, warn};

use crate::backoff::{geometric_jitter, retry_with_backoff, schedule, BackoffPolicy, ScheduledTask};
use crate::crypto;
use crate::error::SdkError;
use crate::payment::PaymentTokens;
use crate::state::StateStore;
use crate::wallet::WalletInfo;

const STATE_KEY: &str = "next_token_redemption_at";

/// Mean spacing between payout runs.
pub const DEFAULT_PAYOUT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
pub struct PayoutError {
    pub reason: SdkError,
    pub should_retry: bool,
}

impl PayoutError {
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

pub struct RedeemPaymentTokens {
    transport: Arc<dyn Transport>,
    payment_tokens: Arc<PaymentTokens>,
}

impl RedeemPaymentTokens {
    pub fn new(transport: Arc<dyn Transport>, payment_tokens: Arc<PaymentTokens>) -> Self {
        Self {
            transport,
            payment_tokens,
        }
    }

    /// Redeem the entire balance in one request. Tokens leave the pool only
    /// after the server accepts them; on failure the balance is untouched.
    pub async fn redeem_all(
        &self,
        wallet: &WalletInfo,
    ) -> std::result::Result<usize, PayoutError> {
        if !wallet.is_valid() {
            return Err(PayoutError::no_retry(SdkError::InvalidWallet(
                "wallet cannot redeem payment tokens".to_string(),
            )));
        }

        let tokens = self.payment_tokens.all().map_err(PayoutError::no_retry)?;
        if tokens.is_empty() {
            return Ok(0);
        }

        let payload = json!({ "paymentId": wallet.payment_id }).to_string();
        let credentials: Vec<_> = tokens
            .iter()
            .map(|info| {
                let token = info.token().map_err(PayoutError::no_retry)?;
                let credential = crypto::sign_payload(&token, &payload);
                Ok(json!({
                    "credential": {
                        "signature": credential.signature,
                        "t": credential.t,
                    },
                    "publicKey": info.public_key,
                }))
            })
            .collect::<std::result::Result<_, PayoutError>>()?;

        let body = json!({
            "payload": payload,
            "paymentCredentials": credentials,
        })
        .to_string();

        let path = format!("/v3/confirmation/payment/{}", wallet.payment_id);
        let request = HttpRequest::put(&path, body)
            .with_header("accept", "application/json")
            .with_header("content-type", "application/json");

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| PayoutError::retry(e.into()))?;

        match response.status {
            200 => {
                self.payment_tokens
                    .remove_many(&tokens)
                    .map_err(PayoutError::retry)?;
                info!(redeemed = tokens.len(), "redeemed payment tokens");
                Ok(tokens.len())
            }
            400 => Err(PayoutError::no_retry(SdkError::InvalidResponse(
                "payment redemption rejected".to_string(),
            ))),
            status => Err(PayoutError::retry(SdkError::InvalidResponse(format!(
                "payment redemption failed with HTTP {}",
                status
            )))),
        }
    }
}

/// Runs [`RedeemPaymentTokens`] on a recurring jittered schedule. The next
/// run time is persisted so restarts neither skip nor pile up payouts.
pub struct PayoutScheduler {
    redeemer: RedeemPaymentTokens,
    store: Arc<dyn StateStore>,
    mean_interval: Duration,
    policy: BackoffPolicy,
}

impl PayoutScheduler {
    pub fn new(
        redeemer: RedeemPaymentTokens,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            redeemer,
            store,
            mean_interval: DEFAULT_PAYOUT_INTERVAL,
            policy: BackoffPolicy::default(),
        }
    }

    pub fn with_interval(mut self, mean_interval: Duration) -> Self {
        self.mean_interval = mean_interval;
        self
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The persisted next run time, scheduling a fresh one if none exists.
    pub fn next_redemption_at(&self) -> crate::error::Result<DateTime<Utc>> {
        if let Some(json) = self.store.load(STATE_KEY)? {
            let at: DateTime<Utc> = serde_json::from_str(&json)?;
            return Ok(at);
        }
        self.schedule_next()
    }

    fn schedule_next(&self) -> crate::error::Result<DateTime<Utc>> {
        let delay = geometric_jitter(self.mean_interval);
        let at = Utc::now()
            + chrono::Duration::from_std(delay)
                .map_err(|e| SdkError::State(format!("payout delay out of range: {}", e)))?;
        self.store.save(STATE_KEY, &serde_json::to_string(&at)?)?;
        info!(%at, "scheduled next payout");
        Ok(at)
    }

    /// Start the recurring payout loop. Dropping the returned task stops it.
    pub fn spawn(self: Arc<Self>, wallet: WalletInfo) -> ScheduledTask {
        schedule(Duration::ZERO, async move {
            loop {
                let delay = match self.next_redemption_at() {
                    Ok(at) => (at - Utc::now())
                        .to_std()
                        .unwrap_or(Duration::ZERO),
                    Err(e) => {
                        warn!(error = %e, "no payout schedule, using the mean interval");
                        geometric_jitter(self.mean_interval)
                    }
                };
                tokio::time::sleep(delay).await;

                let result = retry_with_backoff(
                    &self.policy,
                    |e: &PayoutError| e.should_retry,
                    || self.redeemer.redeem_all(&wallet),
                )
                .await;
                if let Err(e) = result {
                    warn!(error = %e.reason, "payout failed, rescheduling");
                }

                if self.schedule_next().is_err() {
                    // Without persistence the loop still paces itself.
                    tokio::time::sleep(geometric_jitter(self.mean_interval)).await;
                }
            }
        })
    }
}
