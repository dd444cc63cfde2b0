pub mod middleware;

use serde::Deserialize;

// Query parameters that carry credentials: the user's ID token and the Web API key.
const CREDENTIAL_PARAMS: [&str; 2] = ["auth", "key"];

/// Error body returned by the Firebase REST endpoints.
///
/// Identity Toolkit answers with the Google API shape (`{"error": {"code", "message"}}`),
/// while the Realtime Database answers with a bare string (`{"error": "Permission denied"}`).
#[derive(Debug, Deserialize)]
pub struct FirebaseErrorResponse {
    pub error: FirebaseErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FirebaseErrorBody {
    Details(FirebaseErrorDetails),
    Message(String),
}

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorDetails {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
    pub errors: Option<Vec<FirebaseSubError>>,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseSubError {
    pub message: String,
    pub domain: Option<String>,
    pub reason: Option<String>,
}

impl FirebaseErrorResponse {
    pub fn display_message(&self, status: reqwest::StatusCode) -> String {
        match &self.error {
            FirebaseErrorBody::Details(details) => {
                format!("{} (code: {})", details.message, details.code)
            }
            FirebaseErrorBody::Message(message) => {
                format!("{} (code: {})", message, status.as_u16())
            }
        }
    }
}

pub async fn parse_error_response(response: reqwest::Response, default_msg: &str) -> String {
    let status = response.status();
    match response.json::<FirebaseErrorResponse>().await {
        Ok(error_resp) => error_resp.display_message(status),
        Err(_) => format!("{}: {}", default_msg, status),
    }
}

/// Masks credential query parameters (`auth=`, `key=`) in any URL quoted inside `text`.
///
/// Transport errors print the request URL, and the database URL carries the ID token.
pub fn redact_credentials(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(['?', '&']) {
        let (head, tail) = rest.split_at(pos + 1);
        out.push_str(head);
        rest = tail;

        let param = CREDENTIAL_PARAMS
            .iter()
            .find(|p| rest.strip_prefix(**p).is_some_and(|r| r.starts_with('=')));
        if let Some(param) = param {
            let value_start = param.len() + 1;
            let value_end = rest[value_start..]
                .find(|c: char| c == '&' || c == ')' || c.is_whitespace())
                .map_or(rest.len(), |i| value_start + i);
            out.push_str(&rest[..value_start]);
            out.push_str("[REDACTED]");
            rest = &rest[value_end..];
        }
    }

    out.push_str(rest);
    out
}
