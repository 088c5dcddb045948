use async_trait::async_trait;

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// A request against the confirmations server, expressed as a path relative
/// to the configured server URL.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn put(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the confirmations server. Network-level failures are
/// surfaced as `Err`; any response with a status code, success or not, is
/// `Ok` so callers can classify it themselves.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{HttpRequest, HttpResponse, Transport};
    use crate::error::{NetError, Result};

    /// Canned responses keyed by request path. Each response is consumed in
    /// order; the last registered response for a path repeats. Requests are
    /// recorded for assertions.
    #[derive(Default)]
    pub struct StaticResponses {
        responses: Mutex<HashMap<String, VecDeque<(u16, String)>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl StaticResponses {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, path: &str, status: u16, body: &str) {
            self.responses
                .lock()
                .unwrap()
                .entry(path.to_string())
                .or_default()
                .push_back((status, body.to_string()));
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// Simulate a network-level failure for a path.
        pub fn insert_network_failure(&self, path: &str) {
            self.insert(path, 0, "");
        }
    }

    #[async_trait]
    impl Transport for StaticResponses {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request.clone());

            let mut responses = self.responses.lock().unwrap();
            let queue = responses
                .get_mut(&request.path)
                .ok_or_else(|| NetError::Http(format!("no response for {}", request.path)))?;

            let (status, body) = if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue
                    .front()
                    .cloned()
                    .ok_or_else(|| NetError::Http(format!("no response for {}", request.path)))?
            };

            if status == 0 {
                return Err(NetError::Connection("simulated network failure".into()));
            }

            Ok(HttpResponse { status, body })
        }
    }

}
