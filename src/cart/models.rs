use crate::catalog::models::{deserialize_price, Product};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One line of a user's cart, stored under `carts/<uid>/<id>`.
///
/// Shaped like the product it was picked from, plus the chosen option and quantity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CartItem {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_price")]
    pub price: Option<i64>,
    pub image: String,
    pub option: String,
    pub quantity: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CartItem {
    pub fn from_product(product: &Product, option: impl Into<String>, quantity: u32) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            image: product.image.clone(),
            option: option.into(),
            quantity,
            extra: Map::new(),
        }
    }
}
