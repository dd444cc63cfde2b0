//! Firebase project configuration.
//!
//! The four web-app values are read once at startup. Nothing is validated here: a missing
//! value only shows up as an error once the backend is called with it.

const DEFAULT_MAX_RETRIES: u32 = 3;

/// Web-app configuration for a Firebase project.
#[derive(Clone, Default)]
pub struct FirebaseConfig {
    /// Web API key, sent as `key=` to Identity Toolkit.
    pub api_key: String,
    /// Auth domain (e.g. `my-shop.firebaseapp.com`), used as the sign-in request URI.
    pub auth_domain: String,
    /// Realtime Database URL (e.g. `https://my-shop-default-rtdb.firebaseio.com`).
    pub database_url: String,
    /// Project id; names the default database when `database_url` is not set.
    pub project_id: String,
    /// Transient-failure retries for the HTTP transport.
    pub max_retries: u32,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("api_key", &"[REDACTED]")
            .field("auth_domain", &self.auth_domain)
            .field("database_url", &self.database_url)
            .field("project_id", &self.project_id)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl FirebaseConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let max_retries = get_optional_env("FIREBASE_MAX_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        Self {
            api_key: get_env_or_default("FIREBASE_API_KEY"),
            auth_domain: get_env_or_default("FIREBASE_AUTH_DOMAIN"),
            database_url: get_env_or_default("FIREBASE_DB_URL"),
            project_id: get_env_or_default("FIREBASE_PROJECT_ID"),
            max_retries,
        }
    }

    /// Builds a configuration from explicit values with the default retry policy.
    pub fn new(
        api_key: impl Into<String>,
        auth_domain: impl Into<String>,
        database_url: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            auth_domain: auth_domain.into(),
            database_url: database_url.into(),
            project_id: project_id.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// The configured database URL, or the project's default database when none is set.
    pub fn resolved_database_url(&self) -> String {
        if self.database_url.is_empty() && !self.project_id.is_empty() {
            return format!("https://{}-default-rtdb.firebaseio.com", self.project_id);
        }
        self.database_url.clone()
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn get_env_or_default(key: &str) -> String {
    std::env::var(key).unwrap_or_default()
}
