//! Per-user shopping carts.
//!
//! A cart is the set of items under `carts/<uid>`, one per product id. Writing an item for a
//! product that is already in the cart replaces it.

pub mod models;


use self::models::CartItem;
use crate::database::reference::Reference;
use crate::database::{validate_key, DatabaseError, Store};
use std::sync::Arc;

const CARTS_PATH: &str = "carts";

#[derive(Clone)]
pub struct CartRepository {
    store: Arc<dyn Store>,
}

impl CartRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn cart(&self, user_id: &str) -> Result<Reference<'_>, DatabaseError> {
        Ok(self.store.reference(CARTS_PATH).child(validate_key(user_id)?))
    }

    /// Every item in the user's cart; empty if the user has none.
    pub async fn get_cart(&self, user_id: &str) -> Result<Vec<CartItem>, DatabaseError> {
        Ok(self.cart(user_id)?.get().await?.children())
    }

    /// Stores `item` under its product id, replacing anything already there.
    pub async fn add_or_update_to_cart(
        &self,
        user_id: &str,
        item: &CartItem,
    ) -> Result<(), DatabaseError> {
        self.cart(user_id)?
            .child(validate_key(&item.id)?)
            .set(item)
            .await
    }

    /// Removes the product from the cart. Removing something that is not there succeeds.
    pub async fn remove_from_cart(
        &self,
        user_id: &str,
        product_id: &str,
    ) -> Result<(), DatabaseError> {
        self.cart(user_id)?
            .child(validate_key(product_id)?)
            .remove()
            .await
    }
}
