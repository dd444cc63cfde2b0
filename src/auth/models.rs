use crate::database::snapshot::DataSnapshot;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

const GOOGLE_PROVIDER_ID: &str = "google.com";
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// The currently authenticated identity, as handed out by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A session resolved against the admin registry. Never written back anywhere.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub is_admin: bool,
}

impl User {
    pub fn from_session(session: &Session, is_admin: bool) -> Self {
        Self {
            uid: session.uid.clone(),
            display_name: session.display_name.clone(),
            email: session.email.clone(),
            photo_url: session.photo_url.clone(),
            is_admin,
        }
    }
}

/// The set of uids allowed to manage the catalog.
///
/// Stored as a JSON array of uids; the database hands sparse arrays back as objects, so
/// both shapes are accepted. Entries that are not strings are ignored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdminRegistry {
    uids: Vec<String>,
}

impl AdminRegistry {
    /// Returns `None` if nothing is stored at the registry path.
    pub fn from_snapshot(snapshot: &DataSnapshot) -> Option<Self> {
        if !snapshot.exists() {
            return None;
        }

        let uids = match snapshot.value() {
            serde_json::Value::Array(items) => items.iter().collect::<Vec<_>>(),
            serde_json::Value::Object(map) => map.values().collect(),
            other => vec![other],
        }
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();

        Some(Self { uids })
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.uids.iter().any(|u| u == uid)
    }
}

/// A credential obtained from Google by the interactive part of sign-in.
#[derive(Debug, Clone, PartialEq)]
pub enum GoogleCredential {
    IdToken(String),
    AccessToken(String),
}

impl GoogleCredential {
    /// The form-encoded `postBody` expected by `accounts:signInWithIdp`.
    pub fn post_body(&self) -> String {
        let (name, token) = match self {
            GoogleCredential::IdToken(token) => ("id_token", token),
            GoogleCredential::AccessToken(token) => ("access_token", token),
        };

        form_urlencoded::Serializer::new(String::new())
            .append_pair(name, token)
            .append_pair("providerId", GOOGLE_PROVIDER_ID)
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInWithIdpRequest {
    pub post_body: String,
    pub request_uri: String,
    pub return_secure_token: bool,
    pub return_idp_credential: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignInWithIdpResponse {
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Option<String>,
    pub provider_id: Option<String>,
    pub federated_id: Option<String>,
}

impl SignInWithIdpResponse {
    pub fn into_session(self, now: DateTime<Utc>) -> Session {
        Session {
            expires_at: expiry(now, self.expires_in.as_deref()),
            uid: self.local_id,
            display_name: self.display_name,
            email: self.email,
            photo_url: self.photo_url,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
        }
    }
}

/// Response of the Secure Token API (`grant_type=refresh_token`). Unlike Identity Toolkit it
/// uses snake_case.
#[derive(Debug, Deserialize, Default)]
pub struct RefreshTokenResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Option<String>,
    pub user_id: Option<String>,
}

impl RefreshTokenResponse {
    /// `session` with its tokens swapped for the refreshed ones.
    pub fn apply_to(self, session: Session, now: DateTime<Utc>) -> Session {
        Session {
            expires_at: expiry(now, self.expires_in.as_deref()),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            ..session
        }
    }
}

// `expires_in` is a number of seconds sent as a string.
fn expiry(now: DateTime<Utc>, expires_in: Option<&str>) -> DateTime<Utc> {
    let lifetime = expires_in
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(Duration::try_seconds)
        .unwrap_or_else(|| Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));

    now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
