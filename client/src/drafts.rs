use chrono::{DateTime, Utc};
use gazette_shared::ArticleForm;
use tracing::{error, info};

use crate::error::SubmissionError;
use crate::submission::{Intent, SubmissionPipeline};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DraftSaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

/// Keeps repeated draft saves of one editor session pointed at the same row.
#[derive(Debug, Clone, Default)]
pub struct DraftSession {
    draft_id: Option<String>,
    status: DraftSaveStatus,
    last_saved: Option<DateTime<Utc>>,
}

impl DraftSession {
    pub fn new(draft_id: Option<String>) -> Self {
        Self {
            draft_id,
            ..Self::default()
        }
    }

    pub fn draft_id(&self) -> Option<&str> {
        self.draft_id.as_deref()
    }

    pub fn status(&self) -> DraftSaveStatus {
        self.status
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    /// Saves `form` as a draft. A clean form with a known draft id is not sent.
    pub async fn save(
        &mut self,
        pipeline: &SubmissionPipeline,
        form: &ArticleForm,
        user_id: &str,
        is_dirty: bool,
    ) -> Result<String, SubmissionError> {
        if let (false, Some(id)) = (is_dirty, &self.draft_id) {
            return Ok(id.clone());
        }

        self.status = DraftSaveStatus::Saving;
        info!(draft_id = ?self.draft_id, is_dirty, "Saving draft");

        let mut form = form.clone();
        if self.draft_id.is_some() {
            form.id = self.draft_id.clone();
        }

        match pipeline.submit(&form, user_id, Intent::Draft).await {
            Ok(article_id) => {
                if self.draft_id.is_none() {
                    info!(article_id = %article_id, "Setting new draft ID");
                    self.draft_id = Some(article_id.clone());
                }
                self.last_saved = Some(Utc::now());
                self.status = DraftSaveStatus::Saved;
                Ok(self.draft_id.clone().unwrap_or(article_id))
            }
            Err(e) => {
                error!(error = %e, "Error saving draft");
                self.status = DraftSaveStatus::Error;
                Err(e)
            }
        }
    }
}
