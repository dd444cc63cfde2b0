use super::models::{AdminRegistry, GoogleCredential, Session, User};
use super::session::SessionGateway;
use super::*;
use crate::database::memory::MemoryStore;
use crate::database::snapshot::DataSnapshot;
use crate::database::{DatabaseError, Store};
use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn session(uid: &str) -> Session {
    Session {
        uid: uid.to_string(),
        display_name: Some(format!("{} name", uid)),
        email: Some(format!("{}@example.com", uid)),
        photo_url: None,
        id_token: format!("{}-token", uid),
        refresh_token: format!("{}-refresh", uid),
        expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// Signs in whoever is queued up next; fails when nobody is.
#[derive(Default)]
struct ScriptedIdentity {
    state: SessionCell,
    queue: std::sync::Mutex<std::collections::VecDeque<Session>>,
}

impl ScriptedIdentity {
    fn queue(&self, session: Session) {
        self.queue.lock().unwrap().push_back(session);
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdentity {
    async fn sign_in(&self) -> Result<Session, AuthError> {
        let next = self.queue.lock().unwrap().pop_front();
        let session = next.ok_or(AuthError::Cancelled)?;
        self.state.publish(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.state.publish(None);
        Ok(())
    }

    fn on_change(&self) -> SessionReceiver {
        self.state.subscribe()
    }
}

struct FailingStore;

#[async_trait]
impl Store for FailingStore {
    async fn read(&self, _path: &str) -> Result<DataSnapshot, DatabaseError> {
        Err(DatabaseError::ApiError("Permission denied (code: 401)".to_string()))
    }

    async fn write(&self, _path: &str, _value: Value) -> Result<(), DatabaseError> {
        Err(DatabaseError::ApiError("Permission denied (code: 401)".to_string()))
    }

    async fn delete(&self, _path: &str) -> Result<(), DatabaseError> {
        Err(DatabaseError::ApiError("Permission denied (code: 401)".to_string()))
    }
}

fn gateway(identity: Arc<ScriptedIdentity>, store: Arc<dyn Store>) -> SessionGateway {
    SessionGateway::new(identity, store)
}

#[tokio::test]
async fn test_resolve_user_admin_membership() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::with_data(json!({ "admins": ["alice"] })));
    let gateway = gateway(Arc::new(ScriptedIdentity::default()), store);

    let alice = gateway.resolve_user(&session("alice")).await.unwrap();
    assert!(alice.is_admin);
    assert_eq!(alice.uid, "alice");
    assert_eq!(alice.email.as_deref(), Some("alice@example.com"));

    let bob = gateway.resolve_user(&session("bob")).await.unwrap();
    assert!(!bob.is_admin);
}

#[tokio::test]
async fn test_resolve_user_without_registry_is_not_admin() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let gateway = gateway(Arc::new(ScriptedIdentity::default()), store);

    let user = gateway.resolve_user(&session("alice")).await.unwrap();
    assert_eq!(user, User::from_session(&session("alice"), false));
}

#[tokio::test]
async fn test_resolve_user_propagates_store_failure() {
    let gateway = gateway(Arc::new(ScriptedIdentity::default()), Arc::new(FailingStore));

    let result = gateway.resolve_user(&session("alice")).await;
    assert!(matches!(result, Err(DatabaseError::ApiError(_))));
}

#[test]
fn test_admin_registry_shapes() {
    let array = DataSnapshot::new("admins", json!(["a", "b"]));
    assert!(AdminRegistry::from_snapshot(&array).unwrap().contains("b"));

    let sparse = DataSnapshot::new("admins", json!({ "0": "a", "3": "d", "4": 17 }));
    let registry = AdminRegistry::from_snapshot(&sparse).unwrap();
    assert!(registry.contains("d"));
    assert!(!registry.contains("17"));

    let absent = DataSnapshot::new("admins", Value::Null);
    assert!(AdminRegistry::from_snapshot(&absent).is_none());
}

#[tokio::test]
async fn test_login_failure_is_returned() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let gateway = gateway(Arc::new(ScriptedIdentity::default()), store);

    let result = gateway.login().await;
    assert!(matches!(result, Err(AuthError::Cancelled)));

    // signing out while signed out is fine
    gateway.logout().await.unwrap();
}

#[tokio::test]
async fn test_user_state_changes_arrive_in_order() {
    let identity = Arc::new(ScriptedIdentity::default());
    let store: Arc<dyn Store> = Arc::new(MemoryStore::with_data(json!({ "admins": ["alice"] })));
    let gateway = gateway(identity.clone(), store);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = gateway.on_user_state_change(move |user| {
        let _ = tx.send(user);
    });

    identity.queue(session("alice"));
    identity.queue(session("bob"));
    gateway.login().await.unwrap();
    gateway.logout().await.unwrap();
    gateway.login().await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        let user = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        seen.push(user.map(|u| (u.uid, u.is_admin)));
    }

    assert_eq!(
        seen,
        vec![
            None,
            Some(("alice".to_string(), true)),
            None,
            Some(("bob".to_string(), false)),
        ]
    );

    assert!(subscription.is_active());
    subscription.unsubscribe();
}

#[tokio::test]
async fn test_unreadable_registry_delivers_non_admin() {
    let identity = Arc::new(ScriptedIdentity::default());
    let gateway = gateway(identity.clone(), Arc::new(FailingStore));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = gateway.on_user_state_change(move |user| {
        let _ = tx.send(user);
    });

    identity.queue(session("alice"));
    gateway.login().await.unwrap();

    let initial = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(initial, None);

    let user = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(user, Some(User::from_session(&session("alice"), false)));
}

#[test]
fn test_google_credential_post_body() {
    let credential = GoogleCredential::IdToken("abc.def+ghi".to_string());
    assert_eq!(
        credential.post_body(),
        "id_token=abc.def%2Bghi&providerId=google.com"
    );

    let credential = GoogleCredential::AccessToken("ya29".to_string());
    assert_eq!(credential.post_body(), "access_token=ya29&providerId=google.com");
}

fn firebase_identity(server: &MockServer) -> FirebaseIdentity {
    let client = ClientBuilder::new(Client::new()).build();
    FirebaseIdentity::new_with_client(
        client,
        server.url("/v1"),
        server.url("/v1/token"),
        "https://shop.firebaseapp.com/__/auth/handler".to_string(),
        Arc::new(StaticCredential(GoogleCredential::IdToken("google-id-token".to_string()))),
    )
}

#[tokio::test]
async fn test_sign_in_with_google() {
    let server = MockServer::start();
    let identity = firebase_identity(&server);

    let mut changes = identity.on_change();
    assert_eq!(changes.recv().await.unwrap(), None);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/accounts:signInWithIdp")
            .header("content-type", "application/json")
            .json_body(json!({
                "postBody": "id_token=google-id-token&providerId=google.com",
                "requestUri": "https://shop.firebaseapp.com/__/auth/handler",
                "returnSecureToken": true,
                "returnIdpCredential": true
            }));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "providerId": "google.com",
                "localId": "uid-1",
                "email": "alice@example.com",
                "displayName": "Alice",
                "photoUrl": "https://example.com/alice.png",
                "idToken": "firebase-id-token",
                "refreshToken": "refresh-1",
                "expiresIn": "3600"
            }));
    });

    let before = Utc::now();
    let session = identity.sign_in().await.unwrap();
    assert_eq!(session.uid, "uid-1");
    assert_eq!(session.display_name.as_deref(), Some("Alice"));
    assert_eq!(session.id_token, "firebase-id-token");
    assert!(session.expires_at >= before + chrono::Duration::seconds(3600));
    assert!(!session.is_expired(Utc::now()));

    assert_eq!(changes.recv().await.unwrap(), Some(session.clone()));
    assert_eq!(
        identity.token_source().id_token().await.unwrap().as_deref(),
        Some("firebase-id-token")
    );

    identity.sign_out().await.unwrap();
    assert_eq!(changes.recv().await.unwrap(), None);
    assert_eq!(identity.current_session(), None);
    assert_eq!(identity.token_source().id_token().await.unwrap(), None);

    mock.assert();
}

#[tokio::test]
async fn test_sign_in_api_error() {
    let server = MockServer::start();
    let identity = firebase_identity(&server);

    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/accounts:signInWithIdp");
        then.status(400)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": {
                    "code": 400,
                    "message": "INVALID_IDP_RESPONSE",
                    "errors": [
                        { "message": "INVALID_IDP_RESPONSE", "domain": "global", "reason": "invalid" }
                    ]
                }
            }));
    });

    let result = identity.sign_in().await;
    if let Err(AuthError::ApiError(msg)) = result {
        assert_eq!(msg, "INVALID_IDP_RESPONSE (code: 400)");
    } else {
        panic!("Expected ApiError");
    }
    assert_eq!(identity.current_session(), None);

    mock.assert();
}

#[tokio::test]
async fn test_late_subscriber_sees_current_session() {
    let identity = ScriptedIdentity::default();
    identity.queue(session("alice"));
    identity.sign_in().await.unwrap();

    let mut changes = identity.on_change();
    assert_eq!(changes.recv().await.unwrap(), Some(session("alice")));
}

#[tokio::test]
async fn test_empty_static_credential_is_rejected() {
    let flow = StaticCredential(GoogleCredential::IdToken(String::new()));
    assert!(matches!(flow.authorize().await, Err(AuthError::Credential(_))));
}

fn expired_session(uid: &str) -> Session {
    Session {
        expires_at: Utc::now() - chrono::Duration::seconds(1),
        ..session(uid)
    }
}

#[tokio::test]
async fn test_expired_id_token_is_refreshed() {
    let server = MockServer::start();
    let identity = firebase_identity(&server);
    identity.state.publish(Some(expired_session("alice")));
    let mut changes = identity.on_change();
    let initial = changes.recv().await.unwrap().map(|s| s.uid);
    assert_eq!(initial.as_deref(), Some("alice"));

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("grant_type=refresh_token&refresh_token=alice-refresh");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "expires_in": "3600",
                "token_type": "Bearer",
                "refresh_token": "alice-refresh-2",
                "id_token": "alice-token-2",
                "user_id": "alice",
                "project_id": "1234"
            }));
    });

    let tokens = identity.token_source();
    assert_eq!(tokens.id_token().await.unwrap().as_deref(), Some("alice-token-2"));
    // fresh now, so no second exchange
    assert_eq!(tokens.id_token().await.unwrap().as_deref(), Some("alice-token-2"));
    mock.assert();

    let current = identity.current_session().unwrap();
    assert_eq!(current.refresh_token, "alice-refresh-2");
    assert!(!current.is_expired(Utc::now()));

    // a refresh is not a sign-in
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_refresh_never_hands_out_expired_token() {
    let server = MockServer::start();
    let identity = firebase_identity(&server);
    identity.state.publish(Some(expired_session("alice")));

    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/token");
        then.status(400)
            .header("content-type", "application/json")
            .json_body(json!({ "error": { "code": 400, "message": "TOKEN_EXPIRED" } }));
    });

    let result = identity.token_source().id_token().await;
    let err = result.unwrap_err().to_string();
    assert!(err.contains("TOKEN_EXPIRED"));
    assert!(!err.contains("alice-token"));
    mock.assert();
}
