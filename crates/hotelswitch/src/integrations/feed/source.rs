use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::FeedError;
use crate::config::FeedConfig;

/// Trait for fetching the raw feed payload
///
/// This trait allows for mocking the network for testing purposes
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<serde_json::Value, FeedError>;
}

/// Fetches the feed over HTTP(S)
pub struct HttpFeedSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("hotelswitch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<serde_json::Value, FeedError> {
        debug!("Fetching feed from {}", self.url);
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Mock feed source for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockFeedSource {
    pub responses: std::sync::Mutex<std::collections::VecDeque<Result<serde_json::Value, FeedError>>>,
    pub delay: Duration,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockFeedSource {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn push(&self, response: Result<serde_json::Value, FeedError>) {
        self.responses.lock().unwrap().push_back(response);
    }
}

#[cfg(test)]
#[async_trait]
impl FeedSource for MockFeedSource {
    async fn fetch(&self) -> Result<serde_json::Value, FeedError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FeedError::Malformed("no response queued".to_string())))
    }
}
