use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::Config;
use crate::error::{NetError, Result};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};

pub struct HttpClient {
    client: Client,
    config: Config,
}

impl HttpClient {
    pub fn new(config: Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NetError::Config(format!("Failed to build client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.server_url, path)
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = self.url(&request.path);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::debug!("{} {}", request.method.as_str(), url);

        let response = builder
            .send()
            .await
            .map_err(|e| NetError::Connection(format!("{} failed: {}", request.method.as_str(), e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| NetError::Http(format!("Failed to read response body: {}", e)))?;

        Ok(HttpResponse { status, body })
    }
}
