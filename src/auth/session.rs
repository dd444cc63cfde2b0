use crate::auth::models::{AdminRegistry, Session, User};
use crate::auth::{AuthError, IdentityProvider};
use crate::database::{DatabaseError, Store};
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::error;

const ADMINS_PATH: &str = "admins";

/// Sign-in, sign-out and user-state notifications for the storefront.
///
/// Every session coming out of the identity provider is turned into a [`User`] whose
/// `is_admin` flag reflects the admin registry at that moment.
#[derive(Clone)]
pub struct SessionGateway {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn Store>,
}

/// Handle to a running `on_user_state_change` listener.
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stops delivering changes. Dropping the handle instead leaves the listener running.
    pub fn unsubscribe(self) {
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl SessionGateway {
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<dyn Store>) -> Self {
        Self { identity, store }
    }

    /// Starts the interactive sign-in.
    ///
    /// The resulting user arrives through [`Self::on_user_state_change`]; failures are logged
    /// and returned.
    pub async fn login(&self) -> Result<(), AuthError> {
        self.identity
            .sign_in()
            .await
            .map(|_| ())
            .inspect_err(|e| error!(error = %e, "sign-in failed"))
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        self.identity
            .sign_out()
            .await
            .inspect_err(|e| error!(error = %e, "sign-out failed"))
    }

    /// Looks the session up in the admin registry.
    ///
    /// A missing registry means nobody is an admin.
    pub async fn resolve_user(&self, session: &Session) -> Result<User, DatabaseError> {
        resolve_user(self.store.as_ref(), session).await
    }

    /// A stream of resolved users, `None` while signed out.
    ///
    /// The first item is the state at subscription time. Each session is resolved before the
    /// next change is pulled, so items come out in the order the changes happened.
    pub fn user_changes(&self) -> impl Stream<Item = Option<User>> + Send + 'static {
        let receiver = self.identity.on_change();
        let store = Arc::clone(&self.store);

        stream::unfold((receiver, store), |(mut receiver, store)| async move {
            let session = receiver.recv().await?;
            let user = match session {
                Some(session) => Some(resolve_or_default(store.as_ref(), &session).await),
                None => None,
            };
            Some((user, (receiver, store)))
        })
    }

    /// Calls `callback` with every user-state change, one at a time, on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_user_state_change<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(Option<User>) + Send + 'static,
    {
        let mut changes = Box::pin(self.user_changes());
        let handle = tokio::spawn(async move {
            while let Some(user) = changes.next().await {
                callback(user);
            }
        });

        Subscription { handle }
    }
}

async fn resolve_user(store: &dyn Store, session: &Session) -> Result<User, DatabaseError> {
    let snapshot = store.reference(ADMINS_PATH).get().await?;
    let is_admin = AdminRegistry::from_snapshot(&snapshot).is_some_and(|r| r.contains(&session.uid));
    Ok(User::from_session(session, is_admin))
}

// A registry we cannot read grants nothing.
async fn resolve_or_default(store: &dyn Store, session: &Session) -> User {
    match resolve_user(store, session).await {
        Ok(user) => user,
        Err(e) => {
            error!(uid = %session.uid, error = %e, "admin lookup failed");
            User::from_session(session, false)
        }
    }
}
