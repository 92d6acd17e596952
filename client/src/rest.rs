use std::sync::Arc;

use async_trait::async_trait;
use gazette_shared::{CommentRow, NewComment, Session, PUBLISHED};
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use crate::auth::SessionStore;
use crate::backend::{ArticleStore, CommentStore, SessionSource};
use crate::config::ClientConfig;
use crate::error::BackendError;

/// Columns read for every comment, with the author joined from `profiles`.
pub const COMMENT_SELECT: &str =
    "id,content,created_at,user_id,parent_id,article_id,profiles:user_id(display_name,username,avatar_url,role)";

pub(crate) const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Row, procedure and auth access over the service's HTTP API.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    session: SessionStore,
}

impl RestClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_session(config, SessionStore::default())
    }

    pub fn with_session(config: ClientConfig, session: SessionStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
            session,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.session
    }

    pub(crate) fn request(&self, method: Method, url: String) -> RequestBuilder {
        let bearer = self
            .session
            .access_token()
            .unwrap_or_else(|| self.config.anon_key.clone());

        self.http
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, format!("{}/{table}", self.config.rest_url()))
    }
}

// ── Response handling ──

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default, alias = "msg", alias = "error_description")]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

pub(crate) fn api_error(status: u16, body: &[u8]) -> BackendError {
    if status == 401 {
        return BackendError::Unauthorized;
    }

    let fallback = || format!("request failed with status {status}");
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => BackendError::Api {
            status,
            code: parsed.code.map(|c| match c {
                Value::String(s) => s,
                other => other.to_string(),
            }),
            message: parsed.message.or(parsed.error).unwrap_or_else(fallback),
            details: parsed.details,
            hint: parsed.hint,
        },
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            BackendError::Api {
                status,
                code: None,
                message: if text.is_empty() { fallback() } else { text },
                details: None,
                hint: None,
            }
        }
    }
}

pub(crate) async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, BackendError> {
    let status = resp.status();
    let body = resp.bytes().await?;
    if !status.is_success() {
        return Err(api_error(status.as_u16(), &body));
    }
    if body.is_empty() {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(&body)?)
}

pub(crate) async fn expect_success(resp: Response) -> Result<(), BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.bytes().await?;
    Err(api_error(status.as_u16(), &body))
}

// ── Stores ──

#[async_trait]
impl SessionSource for RestClient {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.session.get())
    }
}

#[async_trait]
impl ArticleStore for RestClient {
    async fn clear_featured(&self) -> Result<(), BackendError> {
        let resp = self
            .table(Method::PATCH, "articles")
            .query(&[("featured", "eq.true")])
            .header("Prefer", "return=minimal")
            .json(&json!({ "featured": false }))
            .send()
            .await?;
        expect_success(resp).await
    }

    async fn call_procedure(&self, procedure: &str, args: Value) -> Result<Value, BackendError> {
        let resp = self
            .request(Method::POST, format!("{}/rpc/{procedure}", self.config.rest_url()))
            .json(&args)
            .send()
            .await?;
        read_json(resp).await
    }
}

#[async_trait]
impl CommentStore for RestClient {
    async fn list_comments(&self, article_id: &str) -> Result<Vec<CommentRow>, BackendError> {
        let resp = self
            .table(Method::GET, "comments")
            .query(&[
                ("select", COMMENT_SELECT.to_string()),
                ("article_id", format!("eq.{article_id}")),
                ("parent_id", "is.null".to_string()),
                ("status", format!("eq.{PUBLISHED}")),
                ("order", "created_at.desc".to_string()),
            ])
            .send()
            .await?;
        read_json(resp).await
    }

    async fn list_replies(&self, parent_id: &str) -> Result<Vec<CommentRow>, BackendError> {
        let resp = self
            .table(Method::GET, "comments")
            .query(&[
                ("select", COMMENT_SELECT.to_string()),
                ("parent_id", format!("eq.{parent_id}")),
                ("status", format!("eq.{PUBLISHED}")),
                ("order", "created_at.asc".to_string()),
            ])
            .send()
            .await?;
        read_json(resp).await
    }

    async fn fetch_comment(&self, id: &str) -> Result<CommentRow, BackendError> {
        let resp = self
            .table(Method::GET, "comments")
            .query(&[("select", COMMENT_SELECT.to_string()), ("id", format!("eq.{id}"))])
            .header("Accept", SINGLE_OBJECT)
            .send()
            .await?;
        read_json(resp).await
    }

    async fn insert_comment(&self, comment: &NewComment) -> Result<CommentRow, BackendError> {
        let resp = self
            .table(Method::POST, "comments")
            .query(&[("select", COMMENT_SELECT)])
            .header("Accept", SINGLE_OBJECT)
            .header("Prefer", "return=representation")
            .json(comment)
            .send()
            .await?;
        read_json(resp).await
    }
}
