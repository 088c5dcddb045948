use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Keypair, Signer};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, SdkError};

/// Identifies the client to the server for refill and payout requests.
/// Supplied by the surrounding wallet/identity layer; read-only here.
///
/// `secret_key` is the hex encoding of the 64-byte ed25519 keypair
/// (secret half followed by public half).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub payment_id: String,
    pub public_key: String,
    pub secret_key: String,
}

impl WalletInfo {
    pub fn new(payment_id: &str, public_key: &str, secret_key: &str) -> Self {
        Self {
            payment_id: payment_id.to_string(),
            public_key: public_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.payment_id.is_empty() && self.keypair().is_ok()
    }

    pub fn keypair(&self) -> Result<Keypair> {
        let bytes = hex::decode(&self.secret_key)
            .map_err(|e| SdkError::InvalidWallet(format!("secret key is not hex: {}", e)))?;

        Keypair::from_bytes(&bytes)
            .map_err(|e| SdkError::InvalidWallet(format!("bad keypair: {}", e)))
    }
}

/// `digest` and `signature` header values for a signed request body, in the
/// HTTP signatures style: the digest header carries the SHA-256 of the body
/// and the signature header carries an ed25519 signature over the digest
/// line under the wallet's key.
pub fn build_signature_headers(wallet: &WalletInfo, body: &str) -> Result<(String, String)> {
    let digest = format!("SHA-256={}", BASE64.encode(Sha256::digest(body.as_bytes())));
    let message = format!("digest: {}", digest);

    let keypair = wallet.keypair()?;
    let signature = keypair.sign(message.as_bytes());

    let signature_header = format!(
        r#"keyId="primary",algorithm="ed25519",headers="digest",signature="{}""#,
        BASE64.encode(signature.to_bytes())
    );

    Ok((digest, signature_header))
}
