use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use gazette_shared::{Profile, Session};
use reqwest::Method;
use serde_json::json;
use tracing::{info, warn};

use crate::backend::SessionSource;
use crate::error::BackendError;
use crate::rest::{expect_success, read_json, RestClient, SINGLE_OBJECT};

// ── Session holder ──

/// Shared slot for the signed-in session. Cloning shares the slot.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionStore {
    pub fn get(&self) -> Option<Session> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, session: Session) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn access_token(&self) -> Option<String> {
        self.get().map(|s| s.access_token)
    }

    pub fn user_id(&self) -> Option<String> {
        self.get().map(|s| s.user.id)
    }
}

#[async_trait]
impl SessionSource for SessionStore {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.get())
    }
}

// ── Auth endpoints ──

impl RestClient {
    /// Exchanges email and password for a session and keeps it for later requests.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        info!("Attempting to sign in with email/password");

        let resp = self
            .request(
                Method::POST,
                format!("{}/token?grant_type=password", self.config().auth_url()),
            )
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let session: Session = read_json(resp).await?;

        info!(user_id = %session.user.id, "Signed in");
        self.session_store().set(session.clone());
        Ok(session)
    }

    /// Ends the session. The local session is cleared even when the remote
    /// call fails.
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        if self.session_store().get().is_none() {
            return Ok(());
        }
        let result = match self
            .request(Method::POST, format!("{}/logout", self.config().auth_url()))
            .send()
            .await
        {
            Ok(resp) => expect_success(resp).await,
            Err(e) => Err(e.into()),
        };
        self.session_store().clear();

        if let Err(e) = &result {
            warn!(error = %e, "Remote sign-out failed, local session cleared");
        }
        result
    }

    pub async fn fetch_profile(&self, user_id: &str) -> Result<Profile, BackendError> {
        info!(user_id, "Fetching user profile");

        let resp = self
            .request(Method::GET, format!("{}/profiles", self.config().rest_url()))
            .query(&[("select", "*".to_string()), ("id", format!("eq.{user_id}"))])
            .header("Accept", SINGLE_OBJECT)
            .send()
            .await?;
        read_json(resp).await
    }
}
