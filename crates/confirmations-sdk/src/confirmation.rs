//! Confirmation construction: payload, per-token credential and the blinded
//! payment token the server signs in return.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE as BASE64_URL_SAFE;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{self, TokenGenerator};
use crate::error::Result;
use crate::pool::{UnblindedTokenInfo, UnblindedTokens};

/// The ad event being confirmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationType {
    View,
    Click,
    Landed,
    Dismiss,
}

impl ConfirmationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationType::View => "view",
            ConfirmationType::Click => "click",
            ConfirmationType::Landed => "landed",
            ConfirmationType::Dismiss => "dismiss",
        }
    }
}

/// Client build metadata carried in every confirmation payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub channel: String,
    pub platform: String,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            channel: "release".to_string(),
            platform: std::env::consts::OS.to_string(),
        }
    }
}

// Field order is the canonical payload order; the credential signature is
// computed over this exact serialization.
#[derive(Serialize)]
struct Payload<'a> {
    #[serde(rename = "blindedPaymentToken")]
    blinded_payment_token: &'a str,
    #[serde(rename = "buildChannel")]
    build_channel: &'a str,
    #[serde(rename = "creativeInstanceId")]
    creative_instance_id: &'a str,
    payload: serde_json::Value,
    platform: &'a str,
    #[serde(rename = "type")]
    confirmation_type: &'a str,
}

#[derive(Serialize)]
struct CredentialEnvelope<'a> {
    payload: &'a str,
    signature: &'a str,
    t: &'a str,
}

/// A confirmation ready to be redeemed: the serialized payload, the
/// URL-safe-base64 credential derived from the claimed unblinded token, and
/// a fresh blinded payment token for the server to sign.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub id: String,
    pub creative_instance_id: String,
    pub confirmation_type: ConfirmationType,
    pub unblinded_token: UnblindedTokenInfo,
    pub payment_token: String,
    pub blinded_payment_token: String,
    pub payload: String,
    pub credential: String,
    pub created_at: DateTime<Utc>,
    pub was_created: bool,
}

impl Confirmation {
    /// Take a token from the pool and build a confirmation around it. The
    /// token is consumed up front and is never returned on failure; reusing
    /// it would link the confirmation to a later redemption.
    pub fn claim(
        pool: &UnblindedTokens,
        creative_instance_id: &str,
        confirmation_type: ConfirmationType,
        build: &BuildInfo,
        generator: &Arc<dyn TokenGenerator>,
    ) -> Result<Self> {
        let unblinded_token = pool.take()?;
        Self::new(
            creative_instance_id,
            confirmation_type,
            unblinded_token,
            build,
            generator,
        )
    }

    pub fn new(
        creative_instance_id: &str,
        confirmation_type: ConfirmationType,
        unblinded_token: UnblindedTokenInfo,
        build: &BuildInfo,
        generator: &Arc<dyn TokenGenerator>,
    ) -> Result<Self> {
        Self::with_id(
            &Uuid::new_v4().to_string(),
            creative_instance_id,
            confirmation_type,
            unblinded_token,
            build,
            generator,
        )
    }

    pub fn with_id(
        id: &str,
        creative_instance_id: &str,
        confirmation_type: ConfirmationType,
        unblinded_token: UnblindedTokenInfo,
        build: &BuildInfo,
        generator: &Arc<dyn TokenGenerator>,
    ) -> Result<Self> {
        let payment_token = generator.generate(1).remove(0);
        let blinded_payment_token = payment_token.blind().encode_base64();

        let payload = serde_json::to_string(&Payload {
            blinded_payment_token: &blinded_payment_token,
            build_channel: &build.channel,
            creative_instance_id,
            payload: serde_json::json!({}),
            platform: &build.platform,
            confirmation_type: confirmation_type.as_str(),
        })?;

        let token = unblinded_token.token()?;
        let signed = crypto::sign_payload(&token, &payload);
        let envelope = serde_json::to_string(&CredentialEnvelope {
            payload: &payload,
            signature: &signed.signature,
            t: &signed.t,
        })?;
        let credential = BASE64_URL_SAFE.encode(envelope);

        Ok(Self {
            id: id.to_string(),
            creative_instance_id: creative_instance_id.to_string(),
            confirmation_type,
            unblinded_token,
            payment_token: payment_token.encode_base64(),
            blinded_payment_token,
            payload,
            credential,
            created_at: Utc::now(),
            was_created: false,
        })
    }
}
