//! Client core for the Gazette content platform: article submission and live
//! comment threads against the hosted backend.

pub mod auth;
pub mod backend;
pub mod comments;
pub mod config;
pub mod drafts;
pub mod error;
pub mod realtime;
pub mod rest;
pub mod slug;
pub mod submission;
pub mod thread;
pub mod users;
pub mod validation;

use std::sync::Arc;

pub use auth::SessionStore;
pub use backend::{ArticleStore, ChangeFeed, CommentStore, SessionSource, Subscription};
pub use comments::{CommentSync, CommentThread, Skip, ThreadUpdate};
pub use config::{ClientConfig, EchoFilter, ReviewProcedure};
pub use drafts::{DraftSaveStatus, DraftSession};
pub use error::{AdminError, BackendError, CommentError, ConfigError, ConstraintViolation, Field, FieldError, SubmissionError};
pub use realtime::RealtimeFeed;
pub use rest::RestClient;
pub use submission::{Intent, SubmissionPipeline, SubmissionStage};
pub use thread::ThreadList;
pub use users::{ProfileFilters, ProfilePage};

/// The REST client, submission pipeline and comment sync wired to one session.
pub struct Gazette {
    pub rest: RestClient,
    pub articles: SubmissionPipeline,
    pub comments: CommentSync,
}

impl Gazette {
    pub fn new(config: ClientConfig) -> Self {
        let rest = RestClient::new(config.clone());
        let backend = Arc::new(rest.clone());
        let feed = Arc::new(RealtimeFeed::for_client(&rest));

        Self {
            articles: SubmissionPipeline::new(backend.clone(), backend.clone(), &config),
            comments: CommentSync::new(backend, feed, &config),
            rest,
        }
    }

    pub fn session(&self) -> &SessionStore {
        self.rest.session_store()
    }
}
