//! Two-step confirmation redemption: create the confirmation on the server,
//! then fetch and verify the signed payment token it earned.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use confirmations_net::{HttpRequest, Transport};
use serde_json::Value;
use tracing::{info, warn};

use crate::crypto;
use crate::confirmation::Confirmation;
use crate::error::SdkError;
use crate::issuers::CatalogIssuers;
use crate::payment::{PaymentTokenInfo, PaymentTokens};

/// A failed redemption step, classified for the caller's retry loop.
#[derive(Debug)]
pub struct RedeemError {
    pub reason: SdkError,
    pub should_retry: bool,
    pub should_backoff: bool,
}

impl RedeemError {
    fn no_retry(reason: SdkError) -> Self {
        Self {
            reason,
            should_retry: false,
            should_backoff: false,
        }
    }

    fn retry(reason: SdkError) -> Self {
        Self {
            reason,
            should_retry: true,
            should_backoff: false,
        }
    }

    fn retry_backoff(reason: SdkError) -> Self {
        Self {
            reason,
            should_retry: true,
            should_backoff: true,
        }
    }
}

/// What a successful redemption produced.
#[derive(Debug, PartialEq)]
pub enum Redemption {
    /// The server signed our blinded payment token.
    PaymentToken(PaymentTokenInfo),
    /// The server accepted the confirmation but issues no token for it.
    AcceptedWithoutToken,
}

pub struct RedeemConfirmation {
    transport: Arc<dyn Transport>,
    issuers: Arc<RwLock<CatalogIssuers>>,
    payment_tokens: Arc<PaymentTokens>,
}

impl RedeemConfirmation {
    pub fn new(
        transport: Arc<dyn Transport>,
        issuers: Arc<RwLock<CatalogIssuers>>,
        payment_tokens: Arc<PaymentTokens>,
    ) -> Self {
        Self {
            transport,
            issuers,
            payment_tokens,
        }
    }

    /// Drive the confirmation through both steps. The create step is sticky:
    /// once it has succeeded, later calls go straight to the fetch step.
    pub async fn redeem(
        &self,
        confirmation: &mut Confirmation,
    ) -> std::result::Result<Redemption, RedeemError> {
        let catalog = self.catalog()?;
        if !catalog.is_valid() {
            return Err(RedeemError::retry_backoff(SdkError::UntrustedIssuer(
                "issuer catalog is empty".to_string(),
            )));
        }

        if !confirmation.was_created {
            match self.create_confirmation(confirmation).await? {
                Created::WithToken => confirmation.was_created = true,
                Created::WithoutToken => {
                    confirmation.was_created = true;
                    info!(id = %confirmation.id, "confirmation accepted, no token issued");
                    return Ok(Redemption::AcceptedWithoutToken);
                }
            }
        }

        let payment_token = self.fetch_payment_token(confirmation, &catalog).await?;
        self.payment_tokens
            .add(payment_token.clone())
            .map_err(RedeemError::retry)?;
        info!(id = %confirmation.id, "redeemed confirmation");
        Ok(Redemption::PaymentToken(payment_token))
    }

    fn catalog(&self) -> std::result::Result<CatalogIssuers, RedeemError> {
        self.issuers
            .read()
            .map(|catalog| catalog.clone())
            .map_err(|e| {
                RedeemError::retry(SdkError::State(format!("issuer catalog poisoned: {}", e)))
            })
    }

    async fn create_confirmation(
        &self,
        confirmation: &Confirmation,
    ) -> std::result::Result<Created, RedeemError> {
        let path = format!(
            "/v3/confirmation/{}/{}",
            confirmation.id, confirmation.credential
        );
        let request = HttpRequest::post(&path, confirmation.payload.clone())
            .with_header("accept", "application/json")
            .with_header("content-type", "application/json");

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| RedeemError::retry_backoff(e.into()))?;

        match response.status {
            200 | 201 => Ok(Created::WithToken),
            // I'm a teapot: accepted, but this confirmation earns no token.
            418 => Ok(Created::WithoutToken),
            400 | 409 => Err(RedeemError::no_retry(SdkError::InvalidResponse(format!(
                "confirmation rejected with HTTP {}",
                response.status
            )))),
            404 => Err(RedeemError::retry(SdkError::InvalidResponse(
                "confirmation not found".to_string(),
            ))),
            status => Err(RedeemError::retry_backoff(SdkError::InvalidResponse(
                format!("create confirmation failed with HTTP {}", status),
            ))),
        }
    }

    async fn fetch_payment_token(
        &self,
        confirmation: &Confirmation,
        catalog: &CatalogIssuers,
    ) -> std::result::Result<PaymentTokenInfo, RedeemError> {
        let path = format!("/v3/confirmation/{}/paymentToken", confirmation.id);
        let request = HttpRequest::get(&path).with_header("accept", "application/json");

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| RedeemError::retry_backoff(e.into()))?;

        match response.status {
            200 => {}
            // Still processing, or not yet visible; try again soon.
            202 | 404 => {
                return Err(RedeemError::retry(SdkError::InvalidResponse(format!(
                    "payment token not ready, HTTP {}",
                    response.status
                ))))
            }
            400 => {
                return Err(RedeemError::no_retry(SdkError::InvalidResponse(
                    "payment token request rejected".to_string(),
                )))
            }
            status => {
                return Err(RedeemError::retry_backoff(SdkError::InvalidResponse(
                    format!("fetch payment token failed with HTTP {}", status),
                )))
            }
        }

        let body: Value = serde_json::from_str(&response.body).map_err(|e| {
            RedeemError::retry_backoff(SdkError::InvalidResponse(format!(
                "malformed payment token response: {}",
                e
            )))
        })?;

        self.parse_payment_token(confirmation, catalog, &body)
            .map_err(|e| {
                warn!(id = %confirmation.id, error = %e, "discarding payment token response");
                RedeemError::no_retry(e)
            })
    }

    fn parse_payment_token(
        &self,
        confirmation: &Confirmation,
        catalog: &CatalogIssuers,
        body: &Value,
    ) -> crate::error::Result<PaymentTokenInfo> {
        let id = body["id"]
            .as_str()
            .ok_or_else(|| SdkError::InvalidResponse("missing id".to_string()))?;
        if id != confirmation.id {
            return Err(SdkError::InvalidResponse(format!(
                "response id {} does not match confirmation {}",
                id, confirmation.id
            )));
        }

        let payment_token = body
            .get("paymentToken")
            .ok_or_else(|| SdkError::InvalidResponse("missing paymentToken".to_string()))?;
        let public_key_base64 = payment_token["publicKey"]
            .as_str()
            .ok_or_else(|| SdkError::InvalidResponse("missing publicKey".to_string()))?;
        let public_key = crypto::decode_public_key(public_key_base64)?;
        if !catalog.is_trusted_payment_key(public_key_base64) {
            return Err(SdkError::UntrustedIssuer(public_key_base64.to_string()));
        }

        let batch_proof = payment_token["batchProof"]
            .as_str()
            .ok_or_else(|| SdkError::InvalidResponse("missing batchProof".to_string()))?;
        let proof = crypto::decode_batch_proof(batch_proof)?;

        let signed_values: Vec<String> = payment_token["signedTokens"]
            .as_array()
            .ok_or_else(|| SdkError::InvalidResponse("missing signedTokens".to_string()))?
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    SdkError::InvalidResponse("non-string signed token".to_string())
                })
            })
            .collect::<crate::error::Result<_>>()?;
        if signed_values.len() != 1 {
            return Err(SdkError::InvalidResponse(format!(
                "expected exactly one signed token, got {}",
                signed_values.len()
            )));
        }
        let signed_tokens = crypto::decode_signed_tokens(&signed_values)?;

        let tokens = vec![crypto::decode_token(&confirmation.payment_token)?];
        let blinded = vec![crypto::decode_blinded_token(
            &confirmation.blinded_payment_token,
        )?];
        let mut unblinded =
            crypto::verify_and_unblind(&proof, &tokens, &blinded, &signed_tokens, &public_key)?;

        Ok(PaymentTokenInfo {
            unblinded_token: unblinded.remove(0).encode_base64(),
            public_key: public_key_base64.to_string(),
            confirmation_type: confirmation.confirmation_type,
            redeemed_at: Utc::now(),
        })
    }
}

enum Created {
    WithToken,
    WithoutToken,
}
