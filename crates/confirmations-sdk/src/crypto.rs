//! Boundary around the blind-signature primitives.
//!
//! Every fallible primitive operation is wrapped here so the engines deal in
//! explicit `Result`s and base64 wire forms only. The primitives themselves
//! come from `challenge-bypass-ristretto` and are consumed, never
//! reimplemented.
use challenge_bypass_ristretto::errors::TokenError;
use challenge_bypass_ristretto::voprf::{
    BatchDLEQProof, BlindedToken, PublicKey, SignedToken, Token, UnblindedToken,
};
use hmac::Hmac;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha512;

use crate::error::{Result, SdkError};

/// MAC used for per-token credential signatures.
pub type CredentialMac = Hmac<Sha512>;

fn crypto_err(context: &str, e: TokenError) -> SdkError {
    SdkError::Crypto(format!("{}: {}", context, e))
}

/// Source of fresh tokens. Injected so tests can fix the batch and play the
/// issuer deterministically.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self, count: usize) -> Vec<Token>;
}

pub struct RandomTokenGenerator;

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self, count: usize) -> Vec<Token> {
        (0..count)
            .map(|_| Token::random::<Sha512, _>(&mut OsRng))
            .collect()
    }
}

/// Hands out a fixed batch of tokens, rehydrated from base64. Tokens are not
/// `Clone`, so the canonical form is the encoded one.
#[cfg(test)]
pub struct FixedTokenGenerator {
    tokens: Vec<String>,
}

#[cfg(test)]
impl FixedTokenGenerator {
    pub fn new(tokens_base64: Vec<String>) -> Self {
        Self {
            tokens: tokens_base64,
        }
    }
}

#[cfg(test)]
impl TokenGenerator for FixedTokenGenerator {
    fn generate(&self, count: usize) -> Vec<Token> {
        assert!(count <= self.tokens.len(), "not enough fixed tokens");
        self.tokens[..count]
            .iter()
            .map(|s| Token::decode_base64(s).expect("valid fixed token"))
            .collect()
    }
}

pub fn blind_all(tokens: &[Token]) -> Vec<BlindedToken> {
    tokens.iter().map(|t| t.blind()).collect()
}

pub fn decode_token(s: &str) -> Result<Token> {
    Token::decode_base64(s).map_err(|e| crypto_err("token", e))
}

pub fn decode_blinded_token(s: &str) -> Result<BlindedToken> {
    BlindedToken::decode_base64(s).map_err(|e| crypto_err("blinded token", e))
}

pub fn decode_unblinded_token(s: &str) -> Result<UnblindedToken> {
    UnblindedToken::decode_base64(s).map_err(|e| crypto_err("unblinded token", e))
}

pub fn decode_public_key(s: &str) -> Result<PublicKey> {
    PublicKey::decode_base64(s).map_err(|e| crypto_err("public key", e))
}

pub fn decode_batch_proof(s: &str) -> Result<BatchDLEQProof> {
    BatchDLEQProof::decode_base64(s).map_err(|e| crypto_err("batch DLEQ proof", e))
}

pub fn decode_signed_tokens(values: &[String]) -> Result<Vec<SignedToken>> {
    values
        .iter()
        .map(|s| SignedToken::decode_base64(s).map_err(|e| crypto_err("signed token", e)))
        .collect()
}

/// Verify the batch DLEQ proof and unblind. All-or-nothing: a failed proof
/// yields no tokens at all.
pub fn verify_and_unblind(
    proof: &BatchDLEQProof,
    tokens: &[Token],
    blinded_tokens: &[BlindedToken],
    signed_tokens: &[SignedToken],
    public_key: &PublicKey,
) -> Result<Vec<UnblindedToken>> {
    proof
        .verify_and_unblind::<Sha512, _>(tokens, blinded_tokens, signed_tokens, public_key)
        .map_err(|e| crypto_err("batch DLEQ proof verification", e))
}

/// Credential proving possession of an unblinded token over a payload:
/// an HMAC signature under the token's derived verification key, plus the
/// token preimage `t`, both base64.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub signature: String,
    pub t: String,
}

pub fn sign_payload(unblinded_token: &UnblindedToken, payload: &str) -> Credential {
    let verification_key = unblinded_token.derive_verification_key::<Sha512>();
    let signature = verification_key.sign::<CredentialMac>(payload.as_bytes());

    Credential {
        signature: signature.encode_base64(),
        t: unblinded_token.t.encode_base64(),
    }
}
