//! Realtime Database module.
//!
//! Everything the storefront persists lives in one hierarchical JSON tree addressed by
//! slash-separated paths (`products/<id>`, `carts/<uid>/<productId>`). The [`Store`] trait is
//! the only seam the repositories see; [`FirebaseDatabase`] implements it over the REST API
//! and [`memory::MemoryStore`] implements it in process.
//!
//! A read of a path that holds nothing is not an error: it yields a [`DataSnapshot`] whose
//! `exists()` is `false`.

pub mod memory;
pub mod reference;
pub mod snapshot;


use self::reference::Reference;
use self::snapshot::DataSnapshot;
use crate::config::FirebaseConfig;
use crate::core::middleware::{IdTokenMiddleware, TokenSource};
use crate::core::{parse_error_response, redact_credentials};
use async_trait::async_trait;
use reqwest::{header, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors that can occur during Realtime Database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Wrapper for `reqwest::Error`, with the request URL stripped.
    #[error("HTTP Request failed: {0}")]
    RequestError(reqwest::Error),
    /// A middleware failure, with credentials masked.
    #[error("Middleware error: {0}")]
    MiddlewareError(String),
    /// Errors returned by the Realtime Database REST API.
    #[error("API error: {0}")]
    ApiError(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    /// The configured database URL cannot address a path.
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
    /// A key that cannot name a single child location.
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
}

// Request URLs carry the ID token, so no error may print one.
impl From<reqwest::Error> for DatabaseError {
    fn from(e: reqwest::Error) -> Self {
        DatabaseError::RequestError(e.without_url())
    }
}

impl From<reqwest_middleware::Error> for DatabaseError {
    fn from(e: reqwest_middleware::Error) -> Self {
        match e {
            reqwest_middleware::Error::Reqwest(e) => e.into(),
            other => DatabaseError::MiddlewareError(redact_credentials(&format!("{:#}", other))),
        }
    }
}

/// Checks that `key` names exactly one child: non-empty, no `/`, and none of the characters
/// the Realtime Database refuses in keys (`.`, `$`, `#`, `[`, `]`, ASCII control).
pub fn validate_key(key: &str) -> Result<&str, DatabaseError> {
    let forbidden = |c: char| matches!(c, '/' | '.' | '$' | '#' | '[' | ']') || c.is_ascii_control();
    if key.is_empty() || key.contains(forbidden) {
        return Err(DatabaseError::InvalidKey(key.to_string()));
    }
    Ok(key)
}

/// A path-addressed remote data store.
///
/// Writes replace the whole value at the path; writing `null` is the same as deleting.
/// Deleting a path that holds nothing succeeds.
#[async_trait]
pub trait Store: Send + Sync {
    async fn read(&self, path: &str) -> Result<DataSnapshot, DatabaseError>;
    async fn write(&self, path: &str, value: Value) -> Result<(), DatabaseError>;
    async fn delete(&self, path: &str) -> Result<(), DatabaseError>;
}

impl<'s> dyn Store + 's {
    /// Gets a `Reference` to the location at `path`.
    pub fn reference(&self, path: &str) -> Reference<'_> {
        Reference::new(self, path)
    }
}

/// Client for the Firebase Realtime Database REST API.
pub struct FirebaseDatabase {
    client: ClientWithMiddleware,
    base_url: String,
}

impl FirebaseDatabase {
    /// Creates a new `FirebaseDatabase` instance.
    ///
    /// Requests carry the ID token handed out by `tokens`, if any, so that security rules
    /// see the signed-in user. This is typically called via `StorefrontApp::new()`.
    pub fn new(config: &FirebaseConfig, tokens: Arc<dyn TokenSource>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);

        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .with(IdTokenMiddleware::new(tokens))
            .build();

        Self {
            client,
            base_url: config.resolved_database_url(),
        }
    }

    /// Creates a new `FirebaseDatabase` instance with a custom client and base URL.
    pub fn new_with_client(client: ClientWithMiddleware, base_url: String) -> Self {
        Self { client, base_url }
    }

    // `products/abc` -> `{base_url}/products/abc.json`
    fn url_for(&self, path: &str) -> Result<Url, DatabaseError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| DatabaseError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| DatabaseError::InvalidUrl(self.base_url.clone()))?;
            parts.pop_if_empty();
            match segments.split_last() {
                Some((last, rest)) => {
                    parts.extend(rest);
                    parts.push(&format!("{}.json", last));
                }
                None => {
                    parts.push(".json");
                }
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl Store for FirebaseDatabase {
    async fn read(&self, path: &str) -> Result<DataSnapshot, DatabaseError> {
        let url = self.url_for(path)?;
        debug!(path, "database read");

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DatabaseError::ApiError(
                parse_error_response(response, "Read failed").await,
            ));
        }

        let value: Value = response.json().await?;
        Ok(DataSnapshot::new(path, value))
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), DatabaseError> {
        let mut url = self.url_for(path)?;
        url.query_pairs_mut().append_pair("print", "silent");
        debug!(path, "database write");

        let response = self
            .client
            .put(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&value)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DatabaseError::ApiError(
                parse_error_response(response, "Write failed").await,
            ));
        }

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), DatabaseError> {
        let url = self.url_for(path)?;
        debug!(path, "database delete");

        let response = self.client.delete(url).send().await?;

        if !response.status().is_success() {
            return Err(DatabaseError::ApiError(
                parse_error_response(response, "Delete failed").await,
            ));
        }

        Ok(())
    }
}
