pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_url: String,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

impl Config {
    pub fn with_server_url(mut self, url: &str) -> Self {
        self.server_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}
