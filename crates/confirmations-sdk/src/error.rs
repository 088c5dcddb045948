use thiserror::Error;

pub type Result<T> = std::result::Result<T, SdkError>;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Network error: {0}")]
    Network(#[from] confirmations_net::NetError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Untrusted issuer public key: {0}")]
    UntrustedIssuer(String),

    #[error("Token pool is empty")]
    EmptyPool,

    #[error("Invalid wallet: {0}")]
    InvalidWallet(String),

    #[error("State error: {0}")]
    State(String),
}

impl From<serde_json::Error> for SdkError {
    fn from(e: serde_json::Error) -> Self {
        SdkError::Serialization(e.to_string())
    }
}
