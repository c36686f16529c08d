//! Publishes the local open/closed flag to the shared space API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::PublishConfig;
use crate::engine::SpaceState;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Status publish request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Status publish rejected: {0}")]
    Rejected(String),
}

/// Trait for sending the open flag upstream
///
/// This trait allows for mocking the remote API for testing purposes.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, open: bool) -> Result<(), PublishError>;
}

#[derive(Debug, Serialize)]
struct StatusBody {
    open: bool,
}

/// POSTs `{"open": <bool>}` to the configured endpoint
pub struct HttpStatusPublisher {
    client: reqwest::Client,
    url: String,
}

impl HttpStatusPublisher {
    pub fn new(config: &PublishConfig) -> Result<Self, PublishError> {
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
impl StatusPublisher for HttpStatusPublisher {
    async fn publish(&self, open: bool) -> Result<(), PublishError> {
        self.client
            .post(&self.url)
            .json(&StatusBody { open })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Background task forwarding status changes to a [`StatusPublisher`]
///
/// Only changes of the open flag are sent; CLOSED and UNDETERMINED both
/// publish as not open. A failed publish is not remembered, so the next
/// change is sent even if it carries the same flag.
pub struct PublishWorker {
    tx: mpsc::UnboundedSender<SpaceState>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PublishWorker {
    pub fn spawn(publisher: Box<dyn StatusPublisher>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(Self::run(publisher, rx, stop_rx));
        Self { tx, stop_tx, task }
    }

    /// Sender to hand to a state machine subscriber
    pub fn sender(&self) -> mpsc::UnboundedSender<SpaceState> {
        self.tx.clone()
    }

    async fn run(
        publisher: Box<dyn StatusPublisher>,
        mut rx: mpsc::UnboundedReceiver<SpaceState>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let mut published: Option<bool> = None;

        loop {
            // Queued changes are drained before the stop signal is honored
            let state = tokio::select! {
                biased;
                state = rx.recv() => match state {
                    Some(state) => state,
                    None => break,
                },
                _ = &mut stop_rx => break,
            };

            let open = state == SpaceState::Open;
            if published == Some(open) {
                debug!("Open flag unchanged ({}), not publishing", open);
                continue;
            }

            match publisher.publish(open).await {
                Ok(()) => {
                    info!("Published open={}", open);
                    published = Some(open);
                }
                Err(e) => {
                    warn!("Failed to publish open={}: {}", open, e);
                    published = None;
                }
            }
        }

        debug!("Publish worker exiting");
    }

    /// Publish whatever is already queued, then wait for the worker to exit
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.task.await {
            warn!("Publish worker failed: {}", e);
        }
    }
}

/// Mock publisher for testing
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MockStatusPublisher {
    pub published: std::sync::Arc<std::sync::Mutex<Vec<bool>>>,
    pub fail: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
#[async_trait]
impl StatusPublisher for MockStatusPublisher {
    async fn publish(&self, open: bool) -> Result<(), PublishError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PublishError::Rejected("503 Service Unavailable".to_string()));
        }
        self.published.lock().unwrap().push(open);
        Ok(())
    }
}
