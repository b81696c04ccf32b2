//! Listing records produced by the extraction step.
//!
//! These types double as the extraction contract: their JSON schema is
//! derived with `schemars` and handed to the engine verbatim, and every
//! engine response is deserialized back into them before it is accepted.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// One listing entry as found on the materialized page.
///
/// Only `title` and `link` are required. Every other field stays `None` when
/// the page does not show it; empty strings are never substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Item {
    /// Product title
    pub title: String,
    /// Product URL
    pub link: String,
    /// Current price text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    /// Currency text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_currency: Option<String>,
    /// Original price text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<String>,
    /// Item condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Seller location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Shipping info
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping: Option<String>,
    /// Image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Item {
    /// Create an item with only the required fields set.
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            price: None,
            price_currency: None,
            original_price: None,
            condition: None,
            location: None,
            shipping: None,
            image: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ExtractionResult
// ---------------------------------------------------------------------------

/// Items in the order the engine returned them (not necessarily page order).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExtractionResult {
    pub items: Vec<Item>,
}

impl ExtractionResult {
    /// Number of extracted items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the engine found no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keep only the first `limit` items.
    pub fn truncate(&mut self, limit: usize) {
        self.items.truncate(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_are_omitted_not_empty() {
        let item = Item::new("Mate de calabaza", "https://example.test/item/1");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "title": "Mate de calabaza",
                "link": "https://example.test/item/1"
            })
        );
    }

    #[test]
    fn wire_names_are_camel_case() {
        let json = r#"{
            "title": "Termo",
            "link": "https://example.test/item/2",
            "priceCurrency": "$",
            "originalPrice": "45.000",
            "price": null
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.price_currency.as_deref(), Some("$"));
        assert_eq!(item.original_price.as_deref(), Some("45.000"));
        assert_eq!(item.price, None);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let json = r#"{"items": [{"title": "Sin link"}]}"#;
        assert!(serde_json::from_str::<ExtractionResult>(json).is_err());

        let json = r#"{"items": [{"link": "https://example.test/x"}]}"#;
        assert!(serde_json::from_str::<ExtractionResult>(json).is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = r#"{"title": "A", "link": "https://example.test/a", "rating": "5"}"#;
        assert!(serde_json::from_str::<Item>(json).is_err());
    }
}
