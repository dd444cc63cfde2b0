//! Storefront client for Firebase.
//!
//! Google sign-in with admin resolution, a product catalog and per-user carts, all backed by
//! Firebase Authentication and the Realtime Database.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use storefront_firebase::auth::{models::GoogleCredential, StaticCredential};
//! # use storefront_firebase::StorefrontApp;
//! # async fn run() {
//! let flow = Arc::new(StaticCredential(GoogleCredential::IdToken("...".into())));
//! let app = StorefrontApp::from_env(flow);
//!
//! let _subscription = app.auth().on_user_state_change(|user| println!("{:?}", user));
//! if let Err(e) = app.auth().login().await {
//!     eprintln!("sign-in failed: {}", e);
//!     return;
//! }
//! let products = app.catalog().get_products().await;
//! # }
//! ```

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod core;
pub mod database;

use auth::session::SessionGateway;
use auth::{FirebaseIdentity, IdentityProvider, SignInFlow};
use cart::CartRepository;
use catalog::CatalogRepository;
use config::FirebaseConfig;
use database::{FirebaseDatabase, Store};
use std::sync::Arc;

/// The shared backend handles, created once at startup and handed to every component.
#[derive(Clone)]
pub struct StorefrontApp {
    store: Arc<dyn Store>,
    identity: Arc<dyn IdentityProvider>,
}

impl StorefrontApp {
    pub fn new(config: FirebaseConfig, flow: Arc<dyn SignInFlow>) -> Self {
        let identity = FirebaseIdentity::new(&config, flow);
        let store = FirebaseDatabase::new(&config, identity.token_source());

        Self {
            store: Arc::new(store),
            identity: Arc::new(identity),
        }
    }

    /// Same as [`Self::new`] with the configuration read from the environment.
    pub fn from_env(flow: Arc<dyn SignInFlow>) -> Self {
        Self::new(FirebaseConfig::from_env(), flow)
    }

    /// Builds the app over arbitrary backends, e.g. `database::memory::MemoryStore`.
    pub fn with_backends(store: Arc<dyn Store>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    pub fn auth(&self) -> SessionGateway {
        SessionGateway::new(self.identity.clone(), self.store.clone())
    }

    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.store.clone())
    }

    pub fn cart(&self) -> CartRepository {
        CartRepository::new(self.store.clone())
    }
}
