//! Test-side issuer that plays the server's signing role.

use challenge_bypass_ristretto::voprf::{BatchDLEQProof, SigningKey};
use rand::rngs::OsRng;
use sha2::Sha512;

use crate::crypto::{self, RandomTokenGenerator, TokenGenerator};
use crate::pool::UnblindedTokenInfo;

pub struct Issuer {
    signing_key: SigningKey,
}

impl Issuer {
    pub fn new() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    pub fn public_key_base64(&self) -> String {
        self.signing_key.public_key.encode_base64()
    }

    /// Sign a batch of blinded tokens and prove it, as the server would.
    /// Returns the batch proof and the signed tokens, all base64.
    pub fn sign_and_prove(&self, blinded_base64: &[String]) -> (String, Vec<String>) {
        let blinded: Vec<_> = blinded_base64
            .iter()
            .map(|s| crypto::decode_blinded_token(s).expect("valid blinded token"))
            .collect();
        let signed: Vec<_> = blinded
            .iter()
            .map(|b| self.signing_key.sign(b).expect("signable token"))
            .collect();
        let proof =
            BatchDLEQProof::new::<Sha512, _>(&mut OsRng, &blinded, &signed, &self.signing_key)
                .expect("batch proof");

        (
            proof.encode_base64(),
            signed.iter().map(|s| s.encode_base64()).collect(),
        )
    }

    /// Run the whole issuance locally and hand back spendable tokens.
    pub fn issue_unblinded(&self, count: usize) -> Vec<UnblindedTokenInfo> {
        let tokens = RandomTokenGenerator.generate(count);
        let blinded = crypto::blind_all(&tokens);
        let signed: Vec<_> = blinded
            .iter()
            .map(|b| self.signing_key.sign(b).expect("signable token"))
            .collect();
        let proof =
            BatchDLEQProof::new::<Sha512, _>(&mut OsRng, &blinded, &signed, &self.signing_key)
                .expect("batch proof");
        let unblinded = crypto::verify_and_unblind(
            &proof,
            &tokens,
            &blinded,
            &signed,
            &self.signing_key.public_key,
        )
        .expect("own proof verifies");

        unblinded
            .iter()
            .map(|u| UnblindedTokenInfo::new(u, &self.signing_key.public_key))
            .collect()
    }
}
