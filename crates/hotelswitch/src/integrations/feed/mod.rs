//! Remote feed of sibling locations, polled in the background.

mod parse;
mod refresher;
mod source;

pub use parse::FeedParser;
pub use parse::RemoteSpace;
pub use parse::Snapshot;
pub use refresher::AsyncDataRefresher;
pub use refresher::SnapshotReader;
pub use refresher::UpdateOutcome;
pub use source::FeedSource;
pub use source::HttpFeedSource;
#[cfg(test)]
pub use source::MockFeedSource;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed feed payload: {0}")]
    Malformed(String),
}
