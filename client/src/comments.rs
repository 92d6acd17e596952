//! Comment threads that stay current with the live feed.
//!
//! A thread is opened per article view. The subscription is joined before the
//! initial load starts so nothing inserted in between is lost; a refused join
//! fails the open. events for rows the
//! load already returned are dropped by id. One consumer drives the thread
//! through `&mut self`, so merges need no locking.

use std::sync::Arc;

use futures_util::future::join_all;
use gazette_shared::{ChangeEvent, Comment, NewComment};
use tracing::{debug, error, info, warn};

use crate::backend::{ChangeFeed, CommentStore, Subscription};
use crate::config::{ClientConfig, EchoFilter};
use crate::error::{BackendError, CommentError};
use crate::thread::ThreadList;

/// Why a live event was not folded into the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    OtherArticle,
    OwnEcho,
    AlreadyPresent,
    UnknownParent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThreadUpdate {
    CommentAdded(Comment),
    ReplyAdded { parent_id: String, reply: Comment },
}

pub struct CommentSync {
    store: Arc<dyn CommentStore>,
    feed: Arc<dyn ChangeFeed>,
    echo_filter: EchoFilter,
}

impl CommentSync {
    pub fn new(store: Arc<dyn CommentStore>, feed: Arc<dyn ChangeFeed>, config: &ClientConfig) -> Self {
        Self {
            store,
            feed,
            echo_filter: config.echo_filter,
        }
    }

    pub fn with_echo_filter(mut self, echo_filter: EchoFilter) -> Self {
        self.echo_filter = echo_filter;
        self
    }

    /// Subscribes to inserts for `article_id`, then loads its published thread.
    pub async fn open(&self, article_id: &str, current_user: Option<String>) -> Result<CommentThread, CommentError> {
        info!(article_id, "Fetching comments for article");

        let subscription = self.feed.subscribe(article_id).await?;
        let thread = load_thread(self.store.as_ref(), article_id).await.map_err(|e| {
            error!(article_id, error = %e, "Failed to load comments");
            e
        })?;
        info!(article_id, count = thread.len(), "Comments loaded successfully");

        Ok(CommentThread {
            article_id: article_id.to_string(),
            current_user,
            echo_filter: self.echo_filter,
            store: Arc::clone(&self.store),
            thread,
            subscription: Some(subscription),
        })
    }
}

/// Published top-level comments with their replies. One reply query per
/// comment, issued concurrently; a failed reply query leaves that comment
/// without replies.
pub async fn load_thread(store: &dyn CommentStore, article_id: &str) -> Result<ThreadList, BackendError> {
    let rows = store.list_comments(article_id).await?;

    let comments = join_all(rows.into_iter().map(|row| async move {
        let mut comment = row.into_comment(article_id);
        match store.list_replies(&comment.id).await {
            Ok(replies) => {
                comment.replies = replies
                    .into_iter()
                    .map(|reply| reply.into_comment(article_id))
                    .collect();
            }
            Err(e) => warn!(comment_id = %comment.id, error = %e, "Failed to load replies"),
        }
        comment
    }))
    .await;

    Ok(ThreadList::new(comments))
}

/// An open article thread. Dropping it releases the live subscription.
pub struct CommentThread {
    article_id: String,
    current_user: Option<String>,
    echo_filter: EchoFilter,
    store: Arc<dyn CommentStore>,
    thread: ThreadList,
    subscription: Option<Subscription>,
}

impl CommentThread {
    pub fn article_id(&self) -> &str {
        &self.article_id
    }

    pub fn thread(&self) -> &ThreadList {
        &self.thread
    }

    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

    /// Waits for the next live change that alters the thread. Returns `None`
    /// once the feed has ended or the thread was closed.
    pub async fn next_update(&mut self) -> Option<ThreadUpdate> {
        loop {
            let event = self.subscription.as_mut()?.recv().await?;
            if let Some(update) = self.apply_event(event).await {
                return Some(update);
            }
        }
    }

    /// Screens one live event and, if it belongs here, re-fetches the full row
    /// and folds it in.
    pub async fn apply_event(&mut self, event: ChangeEvent) -> Option<ThreadUpdate> {
        if let Err(skip) = self.screen(&event) {
            debug!(id = %event.record().id, ?skip, "Dropped live comment event");
            return None;
        }

        let record = event.record();
        let row = match self.store.fetch_comment(&record.id).await {
            Ok(row) => row,
            Err(e) => {
                warn!(id = %record.id, error = %e, "Failed to fetch live comment");
                return None;
            }
        };
        let comment = row.into_comment(&self.article_id);

        match event {
            ChangeEvent::CommentInserted(_) => self
                .thread
                .prepend_comment(comment.clone())
                .then_some(ThreadUpdate::CommentAdded(comment)),
            ChangeEvent::ReplyInserted(record) => {
                let parent_id = record.parent_id?;
                self.thread
                    .append_reply(&parent_id, comment.clone())
                    .then_some(ThreadUpdate::ReplyAdded {
                        parent_id,
                        reply: comment,
                    })
            }
        }
    }

    pub fn screen(&self, event: &ChangeEvent) -> Result<(), Skip> {
        let record = event.record();

        if record.article_id != self.article_id {
            return Err(Skip::OtherArticle);
        }
        if self.echo_filter == EchoFilter::Author
            && self.current_user.as_deref() == Some(record.user_id.as_str())
        {
            return Err(Skip::OwnEcho);
        }
        if self.thread.contains(&record.id) {
            return Err(Skip::AlreadyPresent);
        }
        if let ChangeEvent::ReplyInserted(reply) = event {
            let known = reply
                .parent_id
                .as_deref()
                .is_some_and(|parent| self.thread.get(parent).is_some());
            if !known {
                return Err(Skip::UnknownParent);
            }
        }
        Ok(())
    }

    /// Posts a top-level comment and shows it at once, ahead of the feed.
    pub async fn submit_comment(&mut self, content: &str) -> Result<Comment, CommentError> {
        let user_id = self.current_user.clone().ok_or(CommentError::SignInRequired)?;
        if content.trim().is_empty() {
            return Err(CommentError::EmptyContent);
        }

        info!(article_id = %self.article_id, "Submitting comment for article");
        let new = NewComment::published(&self.article_id, user_id, content, None);
        let row = self.store.insert_comment(&new).await.map_err(|e| {
            error!(article_id = %self.article_id, error = %e, "Comment insert failed");
            e
        })?;

        let comment = row.into_comment(&self.article_id);
        self.thread.prepend_comment(comment.clone());
        Ok(comment)
    }

    /// Posts a reply under `parent_id` and shows it at once, ahead of the feed.
    pub async fn submit_reply(&mut self, content: &str, parent_id: &str) -> Result<Comment, CommentError> {
        let user_id = self.current_user.clone().ok_or(CommentError::SignInRequired)?;
        if content.trim().is_empty() {
            return Err(CommentError::EmptyContent);
        }
        if self.thread.get(parent_id).is_none() {
            return Err(CommentError::ParentNotFound(parent_id.to_string()));
        }

        info!(article_id = %self.article_id, parent_id, "Submitting reply for article");
        let new = NewComment::published(&self.article_id, user_id, content, Some(parent_id.to_string()));
        let row = self.store.insert_comment(&new).await.map_err(|e| {
            error!(article_id = %self.article_id, parent_id, error = %e, "Reply insert failed");
            e
        })?;

        let reply = row.into_comment(&self.article_id);
        self.thread.append_reply(parent_id, reply.clone());
        Ok(reply)
    }

    /// Releases the live subscription. The loaded thread stays readable.
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            info!(article_id = %self.article_id, topic = subscription.topic(), "Closed comment thread");
            subscription.release();
        }
    }
}
