#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gazette_client::{
    ArticleStore, BackendError, ChangeFeed, ClientConfig, CommentStore, CommentSync, SessionSource,
    SubmissionPipeline, Subscription,
};
use gazette_shared::{
    ChangeEvent, CommentInsertEvent, CommentRow, NewComment, ProfileSummary, Session, SessionUser,
};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

pub const ARTICLE: &str = "a1";

pub fn session(user_id: &str) -> Session {
    Session {
        access_token: format!("jwt-{user_id}"),
        refresh_token: None,
        expires_in: Some(3600),
        user: SessionUser {
            id: user_id.to_string(),
            email: Some(format!("{user_id}@example.com")),
        },
    }
}

struct FeedHandle {
    article_id: String,
    events: mpsc::UnboundedSender<ChangeEvent>,
    released: oneshot::Receiver<()>,
}

/// In-memory stand-in for the hosted backend.
#[derive(Default)]
pub struct FakeBackend {
    pub session: Mutex<Option<Session>>,
    /// Remote calls in order: "clear_featured", a procedure name,
    /// "subscribe" or "list_comments".
    pub calls: Mutex<Vec<String>>,
    pub procedure_args: Mutex<Vec<Value>>,
    responses: Mutex<VecDeque<Result<Value, BackendError>>>,
    pub fail_clear_featured: AtomicBool,
    pub fail_list_comments: AtomicBool,
    pub reject_subscribe: AtomicBool,

    rows: Mutex<Vec<CommentRow>>,
    profiles: Mutex<HashMap<String, ProfileSummary>>,
    failing_replies: Mutex<HashSet<String>>,
    failing_fetches: Mutex<HashSet<String>>,
    next_id: AtomicU64,
    pub fetch_calls: AtomicU64,
    pub insert_calls: AtomicU64,
    feeds: Mutex<Vec<FeedHandle>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pipeline(self: &Arc<Self>, config: &ClientConfig) -> SubmissionPipeline {
        SubmissionPipeline::new(self.clone(), self.clone(), config)
    }

    pub fn sync(self: &Arc<Self>) -> CommentSync {
        CommentSync::new(self.clone(), self.clone(), &ClientConfig::default())
    }

    // ── articles ──

    pub fn respond(&self, response: Result<Value, BackendError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_args(&self) -> Value {
        self.procedure_args.lock().unwrap().last().cloned().expect("no procedure call")
    }

    // ── comments ──

    pub fn add_profile(&self, user_id: &str, display_name: &str, role: &str) {
        self.profiles.lock().unwrap().insert(
            user_id.to_string(),
            ProfileSummary {
                display_name: Some(display_name.to_string()),
                username: Some(display_name.to_lowercase()),
                avatar_url: None,
                role: Some(role.to_string()),
            },
        );
    }

    /// Stores a row as if another client had inserted it and returns the
    /// raw record the live feed would carry.
    pub fn seed(&self, article_id: &str, user_id: &str, parent_id: Option<&str>, content: &str) -> CommentInsertEvent {
        let row = self.make_row(article_id, user_id, parent_id, content);
        let event = CommentInsertEvent {
            id: row.id.clone(),
            article_id: article_id.to_string(),
            user_id: user_id.to_string(),
            parent_id: row.parent_id.clone(),
        };
        self.rows.lock().unwrap().push(row);
        event
    }

    pub fn fail_replies_for(&self, parent_id: &str) {
        self.failing_replies.lock().unwrap().insert(parent_id.to_string());
    }

    pub fn fail_fetch_of(&self, id: &str) {
        self.failing_fetches.lock().unwrap().insert(id.to_string());
    }

    fn make_row(&self, article_id: &str, user_id: &str, parent_id: Option<&str>, content: &str) -> CommentRow {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        CommentRow {
            id: format!("c{n}"),
            content: content.to_string(),
            created_at: format!("2024-05-01T10:{n:02}:00Z"),
            user_id: user_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            article_id: Some(article_id.to_string()),
            profiles: self.profiles.lock().unwrap().get(user_id).cloned(),
        }
    }

    // ── feed ──

    pub fn subscriptions(&self) -> usize {
        self.feeds.lock().unwrap().len()
    }

    /// Delivers an event on the most recent subscription.
    pub fn emit(&self, record: CommentInsertEvent) {
        let feeds = self.feeds.lock().unwrap();
        let feed = feeds.last().expect("no open subscription");
        feed.events.send(ChangeEvent::from_record(record)).expect("subscription dropped");
    }

    pub fn subscribed_article(&self, index: usize) -> String {
        self.feeds.lock().unwrap()[index].article_id.clone()
    }

    pub fn released(&self, index: usize) -> bool {
        let mut feeds = self.feeds.lock().unwrap();
        !matches!(
            feeds[index].released.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        )
    }
}

#[async_trait]
impl SessionSource for FakeBackend {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.session.lock().unwrap().clone())
    }
}

#[async_trait]
impl ArticleStore for FakeBackend {
    async fn clear_featured(&self) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push("clear_featured".to_string());
        if self.fail_clear_featured.load(Ordering::SeqCst) {
            return Err(BackendError::api(500, None, "update failed"));
        }
        Ok(())
    }

    async fn call_procedure(&self, procedure: &str, args: Value) -> Result<Value, BackendError> {
        self.calls.lock().unwrap().push(procedure.to_string());
        self.procedure_args.lock().unwrap().push(args);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Value::Null))
    }
}

#[async_trait]
impl CommentStore for FakeBackend {
    async fn list_comments(&self, article_id: &str) -> Result<Vec<CommentRow>, BackendError> {
        self.calls.lock().unwrap().push("list_comments".to_string());
        if self.fail_list_comments.load(Ordering::SeqCst) {
            return Err(BackendError::api(500, None, "comments unavailable"));
        }
        let mut rows: Vec<CommentRow> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.article_id.as_deref() == Some(article_id) && r.parent_id.is_none())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_replies(&self, parent_id: &str) -> Result<Vec<CommentRow>, BackendError> {
        if self.failing_replies.lock().unwrap().contains(parent_id) {
            return Err(BackendError::api(500, None, "replies unavailable"));
        }
        let mut rows: Vec<CommentRow> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn fetch_comment(&self, id: &str) -> Result<CommentRow, BackendError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_fetches.lock().unwrap().contains(id) {
            return Err(BackendError::api(503, None, "temporarily unavailable"));
        }
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| BackendError::api(406, Some("PGRST116"), "no rows returned"))
    }

    async fn insert_comment(&self, comment: &NewComment) -> Result<CommentRow, BackendError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let row = self.make_row(
            &comment.article_id,
            &comment.user_id,
            comment.parent_id.as_deref(),
            &comment.content,
        );
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl ChangeFeed for FakeBackend {
    async fn subscribe(&self, article_id: &str) -> Result<Subscription, BackendError> {
        self.calls.lock().unwrap().push("subscribe".to_string());
        if self.reject_subscribe.load(Ordering::SeqCst) {
            return Err(BackendError::Realtime("join rejected: unauthorized".to_string()));
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.feeds.lock().unwrap().push(FeedHandle {
            article_id: article_id.to_string(),
            events: events_tx,
            released: release_rx,
        });
        Ok(Subscription::new(
            format!("realtime:public:comments:{article_id}"),
            events_rx,
            release_tx,
        ))
    }
}
