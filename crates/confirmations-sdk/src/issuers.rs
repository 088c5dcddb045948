use serde::{Deserialize, Serialize};

/// Issuer that signs payment tokens, as published in the catalog.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentIssuer {
    pub name: String,
    pub public_key: String,
}

/// The set of issuer public keys the client currently trusts, taken from the
/// catalog. An empty set is invalid and every engine refuses to run until a
/// catalog update fills it in.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogIssuers {
    pub confirmations_public_key: String,
    pub payment_issuers: Vec<PaymentIssuer>,
}

impl CatalogIssuers {
    pub fn new(confirmations_public_key: &str, payment_issuers: Vec<PaymentIssuer>) -> Self {
        Self {
            confirmations_public_key: confirmations_public_key.to_string(),
            payment_issuers,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.confirmations_public_key.is_empty() && !self.payment_issuers.is_empty()
    }

    /// Whether `public_key` belongs to a catalog payment issuer.
    pub fn is_trusted_payment_key(&self, public_key: &str) -> bool {
        self.payment_issuer_name(public_key).is_some()
    }

    pub fn payment_issuer_name(&self, public_key: &str) -> Option<&str> {
        self.payment_issuers
            .iter()
            .find(|issuer| issuer.public_key == public_key)
            .map(|issuer| issuer.name.as_str())
    }
}
