use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// Fields the catalog sets itself; anything else the caller sends is stored as-is.
const RESERVED_FIELDS: [&str; 5] = ["id", "name", "price", "image", "options"];

/// Product form input, every field still text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewProduct {
    pub name: String,
    pub price: String,
    /// Comma-separated, e.g. `"S,M,L"`.
    pub options: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A product as stored under `products/<id>`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// `None` when the price text did not start with a number.
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_price")]
    pub price: Option<i64>,
    pub image: String,
    pub options: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Product {
    pub(crate) fn compose(id: String, input: NewProduct, image_url: &str) -> Self {
        let mut extra = input.extra;
        extra.retain(|k, _| !RESERVED_FIELDS.contains(&k.as_str()));

        Self {
            id,
            name: input.name,
            price: parse_price(&input.price),
            image: image_url.to_string(),
            options: split_options(&input.options),
            extra,
        }
    }

    /// `true` for the record handed back when a product does not exist.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Reads a price the way a browser's `parseInt` does.
///
/// Leading whitespace and one sign are skipped, a `0x` prefix switches to hexadecimal, and
/// the longest run of digits that follows is the value; whatever comes after is ignored.
/// `"10.9"` is 10, `"12 EUR"` is 12. No leading digits at all (or a value outside `i64`)
/// gives `None`.
pub fn parse_price(input: &str) -> Option<i64> {
    let text = input.trim_start();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let (radix, text) = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(rest) => (16, rest),
        None => (10, text),
    };

    let end = text
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(text.len());
    let digits = &text[..end];
    if digits.is_empty() {
        return None;
    }

    let value = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -value } else { value })
}

/// Reads a stored price leniently. Records edited by hand may hold `12.5` or `"12"` rather
/// than an integer; those are read the way [`parse_price`] reads form input.
pub(crate) fn deserialize_price<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate_price)),
        Value::String(s) => parse_price(&s),
        _ => None,
    })
}

fn truncate_price(value: f64) -> Option<i64> {
    let value = value.trunc();
    // i64::MAX is not representable as f64; the cast rounds it up to 2^63.
    (value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64).then(|| value as i64)
}

/// Splits on every comma. Entries are kept verbatim: no trimming, empty entries included.
pub fn split_options(options: &str) -> Vec<String> {
    options.split(',').map(str::to_string).collect()
}
