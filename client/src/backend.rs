//! Seams between the pipelines and the hosted backend.
//!
//! The REST and realtime clients implement these against the real service;
//! tests implement them in memory.

use async_trait::async_trait;
use gazette_shared::{ChangeEvent, CommentRow, NewComment, Session};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::BackendError;

#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, BackendError>;
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Sets `featured = false` on every article where it is currently true.
    async fn clear_featured(&self) -> Result<(), BackendError>;

    /// Calls a remote procedure and returns its raw JSON result.
    async fn call_procedure(&self, procedure: &str, args: Value) -> Result<Value, BackendError>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Published top-level comments for an article, newest first.
    async fn list_comments(&self, article_id: &str) -> Result<Vec<CommentRow>, BackendError>;

    /// Published replies to a comment, oldest first.
    async fn list_replies(&self, parent_id: &str) -> Result<Vec<CommentRow>, BackendError>;

    async fn fetch_comment(&self, id: &str) -> Result<CommentRow, BackendError>;

    async fn insert_comment(&self, comment: &NewComment) -> Result<CommentRow, BackendError>;
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens one channel for comment inserts on `article_id`. Resolves only
    /// once the service has accepted the channel, so inserts committed after
    /// it returns are delivered.
    async fn subscribe(&self, article_id: &str) -> Result<Subscription, BackendError>;
}

/// An open live channel. Releasing it, explicitly or by drop, tells the
/// owning feed to leave the channel.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    release: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn new(
        topic: impl Into<String>,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
        release: oneshot::Sender<()>,
    ) -> Self {
        Self {
            topic: topic.into(),
            events,
            release: Some(release),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next event, or `None` once the feed has ended.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn release(mut self) {
        self.signal_release();
    }

    fn signal_release(&mut self) {
        if let Some(tx) = self.release.take() {
            // The feed task may already be gone.
            let _ = tx.send(());
            tracing::debug!(topic = %self.topic, "released subscription");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.signal_release();
    }
}
