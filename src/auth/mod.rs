//! Firebase Authentication module.
//!
//! [`IdentityProvider`] is the seam the rest of the crate signs in through. [`FirebaseIdentity`]
//! implements it over the Identity Toolkit REST API with a Google credential; the interactive
//! part that produces that credential (a browser popup, a device flow, ...) is supplied by the
//! caller as a [`SignInFlow`].
//!
//! Session changes are pushed to every subscriber over its own unbounded queue, in the order
//! they happened. A new subscriber first receives the current state.

pub mod models;
pub mod session;
mod token;

#[cfg(test)]
mod tests;

use crate::auth::models::{GoogleCredential, Session, SignInWithIdpRequest, SignInWithIdpResponse};
use crate::config::FirebaseConfig;
use crate::auth::token::SessionTokens;
use crate::core::middleware::{ApiKeyMiddleware, TokenSource};
use crate::core::{parse_error_response, redact_credentials};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::info;

const IDENTITY_TOOLKIT_V1_API: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_V1_API: &str = "https://securetoken.googleapis.com/v1/token";

/// Receives `Some(session)` on sign-in and `None` on sign-out. Drop it to unsubscribe.
pub type SessionReceiver = UnboundedReceiver<Option<Session>>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP Request failed: {0}")]
    RequestError(reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Sign-in was cancelled")]
    Cancelled,
    #[error("Credential error: {0}")]
    Credential(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::RequestError(e.without_url())
    }
}

impl From<reqwest_middleware::Error> for AuthError {
    fn from(e: reqwest_middleware::Error) -> Self {
        match e {
            reqwest_middleware::Error::Reqwest(e) => e.into(),
            other => AuthError::MiddlewareError(redact_credentials(&format!("{:#}", other))),
        }
    }
}

/// An external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self) -> Result<Session, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    fn on_change(&self) -> SessionReceiver;
}

/// The interactive step of Google sign-in.
#[async_trait]
pub trait SignInFlow: Send + Sync {
    async fn authorize(&self) -> Result<GoogleCredential, AuthError>;
}

/// A `SignInFlow` for a credential that was obtained up front.
#[derive(Debug, Clone)]
pub struct StaticCredential(pub GoogleCredential);

#[async_trait]
impl SignInFlow for StaticCredential {
    async fn authorize(&self) -> Result<GoogleCredential, AuthError> {
        let token = match &self.0 {
            GoogleCredential::IdToken(token) | GoogleCredential::AccessToken(token) => token,
        };
        if token.is_empty() {
            return Err(AuthError::Credential("empty Google token".to_string()));
        }
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct SessionState {
    current: Option<Session>,
    listeners: Vec<UnboundedSender<Option<Session>>>,
}

/// The current session plus everyone listening for changes to it.
///
/// Both live under one lock so that listeners observe changes in commit order.
#[derive(Default)]
pub(crate) struct SessionCell {
    state: Mutex<SessionState>,
}

impl SessionCell {
    pub(crate) fn current(&self) -> Option<Session> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    pub(crate) fn publish(&self, session: Option<Session>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.current.is_none() && session.is_none() {
            return;
        }
        state.current = session.clone();
        state.listeners.retain(|tx| tx.send(session.clone()).is_ok());
    }

    pub(crate) fn subscribe(&self) -> SessionReceiver {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (tx, rx) = unbounded_channel();
        if tx.send(state.current.clone()).is_ok() {
            state.listeners.push(tx);
        }
        rx
    }

    /// Swaps in refreshed tokens without notifying anyone. Ignored if the user changed meanwhile.
    pub(crate) fn refresh(&self, session: Session) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.current.as_ref().is_some_and(|c| c.uid == session.uid) {
            state.current = Some(session);
        }
    }
}

/// Google sign-in against Firebase Authentication.
pub struct FirebaseIdentity {
    client: ClientWithMiddleware,
    base_url: String,
    request_uri: String,
    flow: Arc<dyn SignInFlow>,
    state: Arc<SessionCell>,
    tokens: Arc<SessionTokens>,
}

impl FirebaseIdentity {
    /// Creates a new `FirebaseIdentity` instance.
    ///
    /// This is typically called via `StorefrontApp::new()`.
    pub fn new(config: &FirebaseConfig, flow: Arc<dyn SignInFlow>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);

        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .with(ApiKeyMiddleware::new(config.api_key.clone()))
            .build();

        Self::new_with_client(
            client,
            IDENTITY_TOOLKIT_V1_API.to_string(),
            SECURE_TOKEN_V1_API.to_string(),
            format!("https://{}/__/auth/handler", config.auth_domain),
            flow,
        )
    }

    /// Creates a new `FirebaseIdentity` instance with a custom client and endpoints.
    pub fn new_with_client(
        client: ClientWithMiddleware,
        base_url: String,
        token_url: String,
        request_uri: String,
        flow: Arc<dyn SignInFlow>,
    ) -> Self {
        let state = Arc::new(SessionCell::default());
        let tokens = Arc::new(SessionTokens::new(client.clone(), token_url, state.clone()));

        Self {
            client,
            base_url,
            request_uri,
            flow,
            state,
            tokens,
        }
    }

    /// Hands out the signed-in user's ID token to other clients (e.g. the database),
    /// refreshing it once it is about to expire.
    pub fn token_source(&self) -> Arc<dyn TokenSource> {
        self.tokens.clone()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state.current()
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn sign_in(&self) -> Result<Session, AuthError> {
        let credential = self.flow.authorize().await?;

        let url = format!("{}/accounts:signInWithIdp", self.base_url);
        let request = SignInWithIdpRequest {
            post_body: credential.post_body(),
            request_uri: self.request_uri.clone(),
            return_secure_token: true,
            return_idp_credential: true,
        };

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::ApiError(
                parse_error_response(response, "Sign in failed").await,
            ));
        }

        let result: SignInWithIdpResponse = response.json().await?;
        let session = result.into_session(Utc::now());

        info!(uid = %session.uid, "signed in");
        self.state.publish(Some(session.clone()));

        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(session) = self.state.current() {
            info!(uid = %session.uid, "signed out");
        }
        self.state.publish(None);
        Ok(())
    }

    fn on_change(&self) -> SessionReceiver {
        self.state.subscribe()
    }
}
