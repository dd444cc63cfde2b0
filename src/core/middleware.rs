use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use std::sync::Arc;

/// Anything that can hand out the ID token of the signed-in user.
///
/// `Ok(None)` means nobody is signed in.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn id_token(&self) -> Result<Option<String>, anyhow::Error>;
}

/// Appends the Web API key (`key=`) to every Identity Toolkit request.
///
/// An empty key fails the request before it is sent.
#[derive(Clone)]
pub struct ApiKeyMiddleware {
    api_key: String,
}

impl ApiKeyMiddleware {
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }
}

#[async_trait::async_trait]
impl Middleware for ApiKeyMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        if self.api_key.is_empty() {
            return Err(reqwest_middleware::Error::Middleware(anyhow::anyhow!(
                "Firebase API key is not configured"
            )));
        }

        req.url_mut()
            .query_pairs_mut()
            .append_pair("key", &self.api_key);

        next.run(req, extensions).await
    }
}

/// Appends the current user's ID token (`auth=`) to Realtime Database requests.
///
/// Requests go out unauthenticated while nobody is signed in; the database rules decide
/// whether that is allowed.
#[derive(Clone)]
pub struct IdTokenMiddleware {
    source: Arc<dyn TokenSource>,
}

impl IdTokenMiddleware {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self { source }
    }
}

#[async_trait::async_trait]
impl Middleware for IdTokenMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let token = self.source.id_token().await.map_err(|e| {
            reqwest_middleware::Error::Middleware(anyhow::anyhow!("Failed to get ID token: {}", e))
        })?;

        if let Some(token) = token {
            req.url_mut().query_pairs_mut().append_pair("auth", &token);
        }

        next.run(req, extensions).await
    }
}
