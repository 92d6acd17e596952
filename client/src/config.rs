use std::{str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::error::ConfigError;

const DEFAULT_URL: &str = "http://localhost:54321";

/// Which stored procedure a review submission goes through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReviewProcedure {
    #[default]
    WithValidation,
    Optimized,
}

impl ReviewProcedure {
    pub fn name(self) -> &'static str {
        match self {
            ReviewProcedure::WithValidation => "submit_article_with_validation",
            ReviewProcedure::Optimized => "submit_article_optimized",
        }
    }
}

impl FromStr for ReviewProcedure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submit_article_with_validation" | "with-validation" => Ok(Self::WithValidation),
            "submit_article_optimized" | "optimized" => Ok(Self::Optimized),
            other => Err(format!("unknown review procedure '{other}'")),
        }
    }
}

/// How live inserts are matched against rows this client already spliced in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EchoFilter {
    /// Drop every insert authored by the session user.
    #[default]
    Author,
    /// Drop only inserts whose id is already in the thread.
    KnownIds,
}

impl FromStr for EchoFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "author" => Ok(Self::Author),
            "known-ids" | "known_ids" => Ok(Self::KnownIds),
            other => Err(format!("unknown echo filter '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub project_url: String,
    pub anon_key: String,
    pub review_procedure: ReviewProcedure,
    pub save_draft_on_submit: bool,
    pub echo_filter: EchoFilter,
    pub heartbeat_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            project_url: DEFAULT_URL.to_string(),
            anon_key: String::new(),
            review_procedure: ReviewProcedure::default(),
            save_draft_on_submit: true,
            echo_filter: EchoFilter::default(),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn new(project_url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            project_url: project_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            ..Self::default()
        };
        config.check_url()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let heartbeat_secs: u64 = parse_var("GAZETTE_HEARTBEAT_SECS", "30")?;
        if heartbeat_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "GAZETTE_HEARTBEAT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let mut config = Self::new(
            var_or("GAZETTE_URL", DEFAULT_URL),
            std::env::var("GAZETTE_ANON_KEY").unwrap_or_else(|_| {
                warn!("GAZETTE_ANON_KEY not set, requests go out without an api key");
                String::new()
            }),
        )?;
        config.review_procedure = parse_var("GAZETTE_REVIEW_PROCEDURE", "submit_article_with_validation")?;
        config.save_draft_on_submit = parse_var("GAZETTE_SAVE_DRAFT_ON_SUBMIT", "true")?;
        config.echo_filter = parse_var("GAZETTE_ECHO_FILTER", "author")?;
        config.heartbeat_interval = Duration::from_secs(heartbeat_secs);
        Ok(config)
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.project_url)
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.project_url)
    }

    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.project_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.project_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.project_url.clone()
        };
        format!(
            "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            urlencoding::encode(&self.anon_key)
        )
    }

    fn check_url(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.project_url).map_err(|e| ConfigError::Invalid {
            key: "GAZETTE_URL",
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::Invalid {
                key: "GAZETTE_URL",
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn parse_var<T>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var_or(key, default)
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })
}
