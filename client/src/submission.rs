//! Article submission: validate, map, clear the featured slot, call the
//! article procedure and classify whatever comes back.
//!
//! Clearing `featured` and writing the new article are two separate requests.
//! A crash or a concurrent submission between them can leave zero or two
//! featured articles; closing that gap needs a server-side transaction.

use std::sync::Arc;

use gazette_shared::{ArticleForm, ArticleKind, ArticleStatus, MappedRow, SubmissionResponse};
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backend::{ArticleStore, SessionSource};
use crate::config::{ClientConfig, ReviewProcedure};
use crate::error::{BackendError, ConstraintViolation, SubmissionError};
use crate::slug::generate_slug;
use crate::validation::{validate_form, validate_row};

pub const SAVE_ARTICLE_DRAFT: &str = "save_article_draft";

const AUTH_REQUIRED: &str = "Authentication required - no valid session found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Save without sending for moderation. Status is forced to draft.
    Draft,
    /// Send for moderation.
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Idle,
    Validating,
    Unfeaturing,
    Submitting,
    Succeeded,
    Failed,
}

/// Validates, maps and writes article forms.
///
/// One stage channel serves every attempt made through a pipeline, so
/// overlapping `submit` calls on the same instance interleave their stages.
/// Callers that need a per-attempt view run one submission at a time or use
/// one pipeline per form.
pub struct SubmissionPipeline {
    store: Arc<dyn ArticleStore>,
    sessions: Arc<dyn SessionSource>,
    review_procedure: ReviewProcedure,
    save_draft_on_submit: bool,
    stage: watch::Sender<SubmissionStage>,
}

impl SubmissionPipeline {
    pub fn new(store: Arc<dyn ArticleStore>, sessions: Arc<dyn SessionSource>, config: &ClientConfig) -> Self {
        let (stage, _) = watch::channel(SubmissionStage::Idle);
        Self {
            store,
            sessions,
            review_procedure: config.review_procedure,
            save_draft_on_submit: config.save_draft_on_submit,
            stage,
        }
    }

    /// Follows the stage of the current attempt. After an attempt ends the
    /// channel keeps `Succeeded` or `Failed` until the next attempt moves it
    /// back to `Validating`; it never returns to `Idle`.
    pub fn stage(&self) -> watch::Receiver<SubmissionStage> {
        self.stage.subscribe()
    }

    pub fn current_stage(&self) -> SubmissionStage {
        *self.stage.borrow()
    }

    /// Submits as the user of the current session.
    pub async fn submit_with_session(&self, form: &ArticleForm, intent: Intent) -> Result<String, SubmissionError> {
        let session = match self.sessions.current_session().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Session lookup failed");
                None
            }
        };

        match session {
            Some(session) => self.submit(form, &session.user.id, intent).await,
            None => {
                error!("{}", AUTH_REQUIRED);
                self.stage.send_replace(SubmissionStage::Failed);
                Err(SubmissionError::Auth(AUTH_REQUIRED.to_string()))
            }
        }
    }

    /// Runs one attempt. Returns the article id issued by the backend.
    pub async fn submit(&self, form: &ArticleForm, user_id: &str, intent: Intent) -> Result<String, SubmissionError> {
        let result = self.run(form, user_id, intent).await;
        self.stage.send_replace(match result {
            Ok(_) => SubmissionStage::Succeeded,
            Err(_) => SubmissionStage::Failed,
        });
        result
    }

    async fn run(&self, form: &ArticleForm, user_id: &str, intent: Intent) -> Result<String, SubmissionError> {
        self.stage.send_replace(SubmissionStage::Validating);

        if user_id.trim().is_empty() {
            return Err(SubmissionError::Auth(AUTH_REQUIRED.to_string()));
        }

        info!(
            ?intent,
            article_type = ?form.article_type(),
            has_id = form.id.is_some(),
            should_highlight = form.should_highlight,
            "Starting article submission"
        );

        validate_form(form, intent).map_err(|errors| {
            warn!(count = errors.len(), "Article failed validation");
            SubmissionError::Validation(errors)
        })?;

        let row = map_form(form, user_id, intent);
        validate_row(&row).map_err(SubmissionError::Validation)?;
        debug!(
            featured = row.featured,
            status = ?row.status,
            slug = %row.slug,
            "Mapped article row"
        );

        if form.should_highlight {
            self.stage.send_replace(SubmissionStage::Unfeaturing);
            self.store.clear_featured().await.map_err(|e| {
                error!(error = %e, "Error unfeaturing existing articles");
                match e {
                    BackendError::Unauthorized => SubmissionError::Auth(AUTH_REQUIRED.to_string()),
                    _ => SubmissionError::Submission("Failed to update existing featured article".to_string()),
                }
            })?;
        }

        self.stage.send_replace(SubmissionStage::Submitting);
        let article_id = match intent {
            Intent::Draft => self.save_draft(&row).await?,
            Intent::Review => self.submit_for_review(&row, user_id).await?,
        };

        info!(article_id = %article_id, ?intent, "Article submitted successfully");
        Ok(article_id)
    }

    async fn save_draft(&self, row: &MappedRow) -> Result<String, SubmissionError> {
        let value = self
            .store
            .call_procedure(SAVE_ARTICLE_DRAFT, json!({ "p_article_data": row }))
            .await
            .map_err(|e| {
                error!(error = %e, "Draft save failed");
                classify_remote(e)
            })?;

        match value {
            Value::String(id) if !id.trim().is_empty() => Ok(id),
            Value::Null | Value::String(_) => Err(SubmissionError::Submission(
                "Failed to save draft - no article ID returned".to_string(),
            )),
            other => Err(SubmissionError::Unknown(format!("unexpected draft response: {other}"))),
        }
    }

    async fn submit_for_review(&self, row: &MappedRow, user_id: &str) -> Result<String, SubmissionError> {
        let procedure = self.review_procedure.name();
        let args = json!({
            "p_user_id": user_id,
            "p_article_data": row,
            "p_save_draft": self.save_draft_on_submit,
        });

        let value = self.store.call_procedure(procedure, args).await.map_err(|e| {
            error!(procedure, error = %e, code = ?e.code(), "Database submission failed");
            classify_remote(e)
        })?;

        let response = normalize_response(value)?;
        if let Some(duration_ms) = response.duration_ms {
            debug!(procedure, duration_ms, "Article submission timing");
        }

        if !response.success {
            let message = response
                .error_message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Submission failed".to_string());
            error!(procedure, error = %message, "Submission rejected by database");
            return Err(SubmissionError::Submission(message));
        }

        response
            .article_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| SubmissionError::Unknown("submission result has no article ID".to_string()))
    }
}

/// Projects the form onto the row the procedures expect.
pub fn map_form(form: &ArticleForm, user_id: &str, intent: Intent) -> MappedRow {
    let slug = form
        .slug
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| generate_slug(&form.title));

    let status = match intent {
        Intent::Draft => ArticleStatus::Draft,
        Intent::Review => form.status,
    };

    let mut row = MappedRow {
        id: form.id.clone(),
        author_id: user_id.to_string(),
        title: form.title.clone(),
        content: form.content.clone(),
        excerpt: form.excerpt.clone().unwrap_or_default(),
        category_id: form.category_id.clone().filter(|c| !c.is_empty()),
        image_url: form.image_url.clone().unwrap_or_default(),
        slug,
        article_type: form.article_type(),
        status,
        featured: form.should_highlight,
        allow_voting: form.allow_voting,
        publish_date: form.publish_date.clone(),
        video_url: None,
        video_duration: None,
        transcript: None,
        debate_settings: None,
        series_id: None,
        episode_number: None,
    };

    match &form.kind {
        ArticleKind::Standard => {}
        ArticleKind::Video(video) => {
            row.video_url = Some(video.video_url.clone());
            row.video_duration = video.duration;
            row.transcript = video.transcript.clone();
        }
        ArticleKind::Debate(debate) => row.debate_settings = Some(debate.clone()),
        ArticleKind::Storyboard(episode) => {
            row.series_id = Some(episode.series_id.clone());
            row.episode_number = Some(episode.episode_number);
        }
    }

    row
}

/// Accepts the bare-object and one-element-array shapes the procedures return.
pub fn normalize_response(value: Value) -> Result<SubmissionResponse, SubmissionError> {
    let value = match value {
        Value::Array(mut items) => {
            if items.len() != 1 {
                return Err(SubmissionError::Unknown(format!(
                    "expected one submission result, got {}",
                    items.len()
                )));
            }
            items.remove(0)
        }
        other => other,
    };

    if value.is_null() {
        return Err(SubmissionError::Submission(
            "Submission failed - null response from database".to_string(),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| SubmissionError::Unknown(format!("unreadable submission result: {e}")))
}

/// Maps a remote failure onto the submission taxonomy.
pub fn classify_remote(error: BackendError) -> SubmissionError {
    if let Some(violation) = error.code().and_then(ConstraintViolation::from_code) {
        return SubmissionError::Constraint {
            violation,
            message: violation.message().to_string(),
        };
    }

    match error {
        BackendError::Unauthorized => SubmissionError::Auth(AUTH_REQUIRED.to_string()),
        BackendError::Decode(e) => SubmissionError::Unknown(format!("unreadable response: {e}")),
        other => {
            let message = other.to_string();
            SubmissionError::Submission(if message.trim().is_empty() {
                "Failed to submit article".to_string()
            } else {
                message
            })
        }
    }
}
