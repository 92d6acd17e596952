use std::fmt;

use thiserror::Error;

/// Errors raised at the remote boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with an error body.
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },

    /// No session, or the session was rejected.
    #[error("authentication required")]
    Unauthorized,

    /// A body could not be decoded into the expected shape.
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The realtime channel refused or dropped the join.
    #[error("realtime: {0}")]
    Realtime(String),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl BackendError {
    pub fn api(status: u16, code: Option<&str>, message: impl Into<String>) -> Self {
        BackendError::Api {
            status,
            code: code.map(str::to_string),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            BackendError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Form fields that validation can reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Content,
    Excerpt,
    Category,
    ImageUrl,
    VideoUrl,
    Transcript,
    Question,
    YesPosition,
    NoPosition,
    Series,
    Episode,
    Author,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
}

impl FieldError {
    pub fn new(field: Field, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Database constraints the pipeline turns into targeted messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintViolation {
    Duplicate,
    ForeignKey,
    Check,
}

impl ConstraintViolation {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "23505" => Some(Self::Duplicate),
            "23503" => Some(Self::ForeignKey),
            "23514" => Some(Self::Check),
            _ => None,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Duplicate => "An article with this slug already exists. Please choose a different slug.",
            Self::ForeignKey => "Invalid category selected. Please choose a valid category.",
            Self::Check => "Invalid article status or type. Please check your submission.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmissionError {
    #[error("{0}")]
    Auth(String),

    #[error("{}", join_messages(.0))]
    Validation(Vec<FieldError>),

    #[error("{message}")]
    Constraint {
        violation: ConstraintViolation,
        message: String,
    },

    #[error("{0}")]
    Submission(String),

    #[error("{0}")]
    Unknown(String),
}

impl SubmissionError {
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            SubmissionError::Validation(errors) => errors,
            _ => &[],
        }
    }

    pub fn has_field(&self, field: Field) -> bool {
        self.field_errors().iter().any(|e| e.field == field)
    }
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("Please sign in to post a comment")]
    SignInRequired,

    #[error("Comment cannot be empty")]
    EmptyContent,

    #[error("comment {0} is not part of this thread")]
    ParentNotFound(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Please sign in to manage users")]
    SignInRequired,

    #[error("Administrator access required")]
    Forbidden,

    #[error("No profile fields to update")]
    EmptyUpdate,

    #[error(transparent)]
    Backend(#[from] BackendError),
}
