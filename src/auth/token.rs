//! ID tokens for the signed-in user.
//!
//! Firebase ID tokens live for an hour. Before handing out one that is about to expire, the
//! session's refresh token is exchanged for a new pair through the Secure Token API. A refresh
//! does not count as a session change: subscribers are not notified.

use crate::auth::models::{RefreshTokenResponse, Session};
use crate::auth::{AuthError, SessionCell};
use crate::core::middleware::TokenSource;
use crate::core::parse_error_response;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::form_urlencoded;

const REFRESH_MARGIN_SECS: i64 = 300;

pub(crate) struct SessionTokens {
    client: ClientWithMiddleware,
    token_url: String,
    state: Arc<SessionCell>,
    refreshing: Mutex<()>,
}

impl SessionTokens {
    pub(crate) fn new(client: ClientWithMiddleware, token_url: String, state: Arc<SessionCell>) -> Self {
        Self {
            client,
            token_url,
            state,
            refreshing: Mutex::new(()),
        }
    }

    async fn refresh(&self, session: &Session) -> Result<RefreshTokenResponse, AuthError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", &session.refresh_token)
            .finish();

        let response = self
            .client
            .post(&self.token_url)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::ApiError(
                parse_error_response(response, "Token refresh failed").await,
            ));
        }

        let refreshed: RefreshTokenResponse = response.json().await?;
        if refreshed.user_id.as_deref().is_some_and(|uid| uid != session.uid) {
            return Err(AuthError::Credential("refreshed token belongs to another user".to_string()));
        }

        Ok(refreshed)
    }
}

fn is_fresh(session: &Session) -> bool {
    !session.is_expired(Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS))
}

#[async_trait]
impl TokenSource for SessionTokens {
    async fn id_token(&self) -> Result<Option<String>, anyhow::Error> {
        match self.state.current() {
            None => return Ok(None),
            Some(session) if is_fresh(&session) => return Ok(Some(session.id_token)),
            Some(_) => {}
        }

        // One refresh at a time; whoever waited picks up the result.
        let _guard = self.refreshing.lock().await;
        let Some(session) = self.state.current() else {
            return Ok(None);
        };
        if is_fresh(&session) {
            return Ok(Some(session.id_token));
        }

        debug!(uid = %session.uid, "refreshing ID token");
        let refreshed = self
            .refresh(&session)
            .await
            .inspect_err(|e| warn!(uid = %session.uid, error = %e, "ID token refresh failed"))?;

        let session = refreshed.apply_to(session, Utc::now());
        let id_token = session.id_token.clone();
        self.state.refresh(session);

        Ok(Some(id_token))
    }
}
