//! HTTP transport layer for the anonymous confirmations protocol.
//!
//! Engines in `confirmations-sdk` talk to the server through the [`Transport`]
//! trait over normalized request/response values, so protocol logic can be
//! exercised against canned responses without a live server.

pub mod config;
pub mod error;
pub mod http_client;
pub mod transport;

pub use config::{Config, DEFAULT_SERVER_URL};
pub use error::{NetError, Result};
pub use http_client::HttpClient;
pub use transport::{HttpRequest, HttpResponse, Method, Transport};

pub fn client(config: Config) -> Result<HttpClient> {
    HttpClient::new(config)
}
