//! Product catalog.
//!
//! Products live under `products/<id>` and are only ever created or read here.

pub mod models;


use self::models::{NewProduct, Product};
use crate::database::reference::Reference;
use crate::database::{validate_key, DatabaseError, Store};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const PRODUCTS_PATH: &str = "products";

#[derive(Clone)]
pub struct CatalogRepository {
    store: Arc<dyn Store>,
}

impl CatalogRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn products(&self) -> Reference<'_> {
        self.store.reference(PRODUCTS_PATH)
    }

    /// Stores `product` under a freshly generated id and returns the stored record.
    ///
    /// Every call creates a new product, even for identical input.
    pub async fn add_new_product(
        &self,
        product: NewProduct,
        image_url: &str,
    ) -> Result<Product, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let record = Product::compose(id, product, image_url);

        self.products().child(&record.id).set(&record).await?;
        info!(id = %record.id, name = %record.name, "product added");

        Ok(record)
    }

    /// All products, in whatever order the store returns them. Empty if there are none.
    pub async fn get_products(&self) -> Result<Vec<Product>, DatabaseError> {
        Ok(self.products().get().await?.children())
    }

    /// The product with `id`, or an empty record (see [`Product::is_empty`]) if there is none.
    pub async fn get_product(&self, id: &str) -> Result<Product, DatabaseError> {
        let snapshot = self.products().child(validate_key(id)?).get().await?;
        Ok(snapshot.data()?.unwrap_or_default())
    }
}
