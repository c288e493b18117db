use serde_json::{json, Map, Value};

use super::Platform;
use crate::models::ProductData;
use crate::utils::error::{AppError, Result};

/// Build the platform-specific submission payload for a direct-API platform.
/// Pure transform: no IO, independently testable per platform.
pub fn build_payload(platform: Platform, product: &ProductData) -> Result<Value> {
    match platform {
        Platform::Naver => Ok(naver_payload(product)),
        Platform::Cafe24 => Ok(cafe24_payload(product)),
        Platform::Coupang => Ok(coupang_payload(product)),
        _ => Err(AppError::Validation(format!(
            "platform {} has no direct-API payload",
            platform
        ))),
    }
}

/// Pull the platform-assigned product id and listing URL out of a 2xx
/// response body. The field names vary per platform.
pub fn extract_listing(platform: Platform, body: &Value) -> (Option<String>, Option<String>) {
    match platform {
        Platform::Naver => (
            string_field(body, "productId"),
            string_field(body, "productUrl"),
        ),
        Platform::Cafe24 => {
            let product = body.pointer("/product").unwrap_or(body);
            (
                string_field(product, "product_no"),
                string_field(product, "detail_url"),
            )
        }
        Platform::Coupang => {
            let data = body.pointer("/data").unwrap_or(body);
            (
                string_field(data, "sellerProductId"),
                string_field(data, "productUrl"),
            )
        }
        _ => (None, None),
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    match value.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn naver_payload(product: &ProductData) -> Value {
    let mut payload = Map::new();
    payload.insert("name".into(), json!(product.name));
    payload.insert("description".into(), json!(product.description));
    payload.insert("price".into(), json!(product.price));
    payload.insert("category".into(), json!(product.category));
    payload.insert("images".into(), json!(product.image_urls));

    if let Some(brand) = &product.brand {
        payload.insert("brand".into(), json!(brand));
    }
    if let Some(model) = &product.model {
        payload.insert("model".into(), json!(model));
    }
    if let Some(condition) = &product.condition {
        payload.insert("condition".into(), json!(condition));
    }
    if product.delivery_available {
        payload.insert(
            "delivery".into(),
            json!({ "available": true, "fee": product.delivery_fee.unwrap_or(0) }),
        );
    }
    if !product.tags.is_empty() {
        payload.insert("tags".into(), json!(product.tags));
    }

    Value::Object(payload)
}

fn cafe24_payload(product: &ProductData) -> Value {
    json!({
        "request": {
            "product": {
                "product_name": product.name,
                "summary_description": product.description,
                "price": product.price.to_string(),
                "category": product.category,
                "image_upload_type": "A",
                "additional_images": product.image_urls,
                "display": "T",
                "selling": "T",
            }
        }
    })
}

fn coupang_payload(product: &ProductData) -> Value {
    let mut payload = Map::new();
    payload.insert("sellerProductName".into(), json!(product.name));
    payload.insert("displayProductName".into(), json!(product.name));
    payload.insert("generalProductName".into(), json!(product.name));
    payload.insert("productDescription".into(), json!(product.description));
    payload.insert("salePrice".into(), json!(product.price));
    payload.insert("displayCategoryCode".into(), json!(product.category));
    payload.insert(
        "images".into(),
        json!(product
            .image_urls
            .iter()
            .enumerate()
            .map(|(i, url)| json!({ "imageOrder": i, "vendorPath": url }))
            .collect::<Vec<_>>()),
    );
    if let Some(brand) = &product.brand {
        payload.insert("brand".into(), json!(brand));
    }

    Value::Object(payload)
}

/// Overlay template defaults under a built payload: explicit product fields
/// win, template fields fill the gaps (shipping policies, seller codes and
/// the like that do not come from ProductData).
pub fn merge_template_defaults(payload: Value, defaults: &Value) -> Value {
    match (payload, defaults) {
        (Value::Object(mut base), Value::Object(extra)) => {
            for (key, value) in extra {
                match base.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        let merged =
                            merge_template_defaults(existing.take(), value);
                        base.insert(key.clone(), merged);
                    }
                    Some(_) => {} // product field wins
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::Object(base)
        }
        (payload, _) => payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProductData {
        ProductData {
            external_id: "inv-1001".to_string(),
            name: "Vintage Film Camera".to_string(),
            description: "Fully working".to_string(),
            price: 185_000,
            category: "디지털".to_string(),
            condition: Some("거의새것".to_string()),
            image_urls: vec!["https://cdn.example.com/a.jpg".to_string()],
            location: None,
            delivery_available: true,
            delivery_fee: Some(3000),
            tags: vec!["camera".to_string()],
            brand: Some("Canon".to_string()),
            model: None,
        }
    }

    #[test]
    fn test_naver_payload_fields() {
        let payload = build_payload(Platform::Naver, &sample()).unwrap();
        assert_eq!(payload["name"], "Vintage Film Camera");
        assert_eq!(payload["price"], 185_000);
        assert_eq!(payload["brand"], "Canon");
        assert_eq!(payload["delivery"]["fee"], 3000);
        assert!(payload.get("model").is_none());
    }

    #[test]
    fn test_cafe24_payload_nesting() {
        let payload = build_payload(Platform::Cafe24, &sample()).unwrap();
        let product = &payload["request"]["product"];
        assert_eq!(product["product_name"], "Vintage Film Camera");
        assert_eq!(product["price"], "185000");
    }

    #[test]
    fn test_coupang_payload_images() {
        let payload = build_payload(Platform::Coupang, &sample()).unwrap();
        assert_eq!(payload["sellerProductName"], "Vintage Film Camera");
        assert_eq!(payload["images"][0]["imageOrder"], 0);
        assert_eq!(payload["images"][0]["vendorPath"], "https://cdn.example.com/a.jpg");
    }

    #[test]
    fn test_automation_platform_has_no_payload() {
        assert!(build_payload(Platform::Bunjang, &sample()).is_err());
    }

    #[test]
    fn test_extract_listing_naver() {
        let body = serde_json::json!({ "productId": 91823, "productUrl": "https://smartstore.example/p/91823" });
        let (id, url) = extract_listing(Platform::Naver, &body);
        assert_eq!(id.as_deref(), Some("91823"));
        assert_eq!(url.as_deref(), Some("https://smartstore.example/p/91823"));
    }

    #[test]
    fn test_extract_listing_cafe24_nested() {
        let body = serde_json::json!({ "product": { "product_no": "77", "detail_url": "https://shop.example/77" } });
        let (id, url) = extract_listing(Platform::Cafe24, &body);
        assert_eq!(id.as_deref(), Some("77"));
        assert_eq!(url.as_deref(), Some("https://shop.example/77"));
    }

    #[test]
    fn test_extract_listing_missing_fields() {
        let body = serde_json::json!({ "something": "else" });
        let (id, url) = extract_listing(Platform::Coupang, &body);
        assert!(id.is_none());
        assert!(url.is_none());
    }

    #[test]
    fn test_merge_template_defaults() {
        let payload = serde_json::json!({ "name": "Camera", "delivery": { "available": true } });
        let defaults = serde_json::json!({ "name": "ignored", "sellerCode": "S-9", "delivery": { "policy": "standard" } });
        let merged = merge_template_defaults(payload, &defaults);
        assert_eq!(merged["name"], "Camera"); // product wins
        assert_eq!(merged["sellerCode"], "S-9"); // template fills gap
        assert_eq!(merged["delivery"]["available"], true);
        assert_eq!(merged["delivery"]["policy"], "standard");
    }
}
