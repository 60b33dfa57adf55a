//! Wire decoding and invariant checks.
//!
//! Both failure kinds are permanent for a given payload, so callers never
//! retry them.

use snafu::prelude::*;

use super::model::{Delivery, Item, Order, Payment};
use crate::error::{DecodeError, JsonSnafu, ValidationError};

/// Deserialize a JSON payload into an [`Order`].
///
/// Only syntax and type errors fail here; missing fields are left for
/// [`validate`].
pub fn decode(payload: &[u8]) -> Result<Order, DecodeError> {
    serde_json::from_slice(payload).context(JsonSnafu)
}

/// Check every field invariant, reporting all violations at once.
pub fn validate(order: &Order) -> Result<(), ValidationError> {
    let mut v = Violations::default();

    v.required("order_uid", &order.order_uid);
    v.required("track_number", &order.track_number);
    v.required("entry", &order.entry);
    v.required("locale", &order.locale);
    v.required("internal_signature", &order.internal_signature);
    v.required("customer_id", &order.customer_id);
    v.required("delivery_service", &order.delivery_service);
    v.required("shard_key", &order.shard_key);
    v.non_negative("sm_id", order.sm_id);
    if order.date_created.is_none() {
        v.push("date_created is required".to_string());
    }
    v.required("off_shard", &order.off_shard);

    check_delivery(&mut v, &order.delivery);
    check_payment(&mut v, &order.payment);

    if order.items.is_empty() {
        v.push("items must contain at least one item".to_string());
    }
    for (i, item) in order.items.iter().enumerate() {
        check_item(&mut v, &format!("items[{i}]"), item);
    }

    v.finish()
}

fn check_delivery(v: &mut Violations, d: &Delivery) {
    v.required("delivery.name", &d.name);
    v.required("delivery.phone", &d.phone);
    v.required("delivery.zip", &d.zip);
    v.required("delivery.city", &d.city);
    v.required("delivery.address", &d.address);
    v.required("delivery.region", &d.region);
    if v.required("delivery.email", &d.email) && !looks_like_email(&d.email) {
        v.push(format!("delivery.email must be a valid email, got {:?}", d.email));
    }
}

fn check_payment(v: &mut Violations, p: &Payment) {
    v.required("payment.transaction", &p.transaction);
    v.required("payment.request", &p.request);
    v.required("payment.currency", &p.currency);
    v.required("payment.provider", &p.provider);
    v.non_negative("payment.amount", p.amount);
    v.non_negative("payment.payment_dt", p.payment_dt);
    v.required("payment.bank", &p.bank);
    v.non_negative("payment.delivery_cost", p.delivery_cost);
    v.non_negative("payment.goods_total", p.goods_total);
    v.non_negative("payment.custom_fee", p.custom_fee);
}

fn check_item(v: &mut Violations, prefix: &str, item: &Item) {
    if item.chrt_id == 0 {
        v.push(format!("{prefix}.chrt_id is required"));
    }
    v.required(&format!("{prefix}.track_number"), &item.track_number);
    v.non_negative(&format!("{prefix}.price"), item.price);
    v.required(&format!("{prefix}.rid"), &item.rid);
    v.required(&format!("{prefix}.name"), &item.name);
    if !(0..=100).contains(&item.sale) {
        v.push(format!(
            "{prefix}.sale must be between 0 and 100, got {}",
            item.sale
        ));
    }
    v.required(&format!("{prefix}.size"), &item.size);
    v.non_negative(&format!("{prefix}.total_price"), item.total_price);
    v.non_negative(&format!("{prefix}.nm_id"), item.nm_id);
    v.required(&format!("{prefix}.brand"), &item.brand);
    v.non_negative(&format!("{prefix}.status"), item.status);
}

/// Local part, `@`, and a dotted domain with no empty labels.
fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !s.contains(char::is_whitespace)
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn push(&mut self, message: String) {
        self.0.push(message);
    }

    /// Returns whether the field was present.
    fn required(&mut self, field: &str, value: &str) -> bool {
        let present = !value.trim().is_empty();
        if !present {
            self.push(format!("{field} is required"));
        }
        present
    }

    fn non_negative(&mut self, field: &str, value: i64) {
        if value < 0 {
            self.push(format!("{field} must be >= 0, got {value}"));
        }
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Invalid { violations: self.0 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "order_uid": "b563feb7b2b84b6test",
            "track_number": "WBILMTESTTRACK",
            "entry": "WBIL",
            "delivery": {
                "name": "Test Testov",
                "phone": "+9720000000",
                "zip": "2639809",
                "city": "Kiryat Mozkin",
                "address": "Ploshad Mira 15",
                "region": "Kraiot",
                "email": "test@gmail.com"
            },
            "payment": {
                "transaction": "b563feb7b2b84b6test",
                "request": "req-1",
                "currency": "USD",
                "provider": "wbpay",
                "amount": 1817,
                "payment_dt": 1637907727,
                "bank": "alpha",
                "delivery_cost": 1500,
                "goods_total": 317,
                "custom_fee": 0
            },
            "items": [{
                "chrt_id": 9934930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }],
            "locale": "en",
            "internal_signature": "sig",
            "customer_id": "test",
            "delivery_service": "meest",
            "shard_key": "9",
            "sm_id": 99,
            "date_created": "2021-11-26T06:22:19Z",
            "off_shard": "1"
        })
    }

    fn decode_value(value: &serde_json::Value) -> Order {
        decode(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_valid_order_passes() {
        let order = decode_value(&sample());
        assert_eq!(order.order_uid, "b563feb7b2b84b6test");
        assert_eq!(order.items[0].sale, 30);
        assert!(order.date_created.is_some());
        validate(&order).unwrap();
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        assert!(decode(b"{not json").is_err());
        assert!(decode(b"").is_err());
        assert!(decode(br#"{"sm_id": "ninety-nine"}"#).is_err());
    }

    #[test]
    fn test_missing_fields_decode_then_fail_validation() {
        let order = decode(br#"{"order_uid": "x"}"#).unwrap();
        let err = validate(&order).unwrap_err();
        let violations = err.violations();
        assert!(violations.contains(&"track_number is required".to_string()));
        assert!(violations.contains(&"date_created is required".to_string()));
        assert!(violations.contains(&"items must contain at least one item".to_string()));
        assert!(violations.contains(&"delivery.email is required".to_string()));
    }

    #[test]
    fn test_sale_out_of_range() {
        let mut value = sample();
        value["items"][0]["sale"] = json!(150);
        let err = validate(&decode_value(&value)).unwrap_err();
        assert_eq!(
            err.violations(),
            ["items[0].sale must be between 0 and 100, got 150"]
        );
    }

    #[test]
    fn test_negative_amounts_reported_together() {
        let mut value = sample();
        value["payment"]["amount"] = json!(-1);
        value["items"][0]["price"] = json!(-5);
        let err = validate(&decode_value(&value)).unwrap_err();
        assert_eq!(err.violations().len(), 2);
        assert!(err.to_string().contains("payment.amount must be >= 0, got -1"));
        assert!(err.to_string().contains("items[0].price must be >= 0, got -5"));
    }

    #[test]
    fn test_zero_chrt_id_rejected() {
        let mut value = sample();
        value["items"][0]["chrt_id"] = json!(0);
        let err = validate(&decode_value(&value)).unwrap_err();
        assert_eq!(err.violations(), ["items[0].chrt_id is required"]);
    }

    #[test]
    fn test_email_shape() {
        assert!(looks_like_email("a@b.co"));
        assert!(!looks_like_email("no-at-sign"));
        assert!(!looks_like_email("@b.co"));
        assert!(!looks_like_email("a@nodot"));
        assert!(!looks_like_email("a@b..co"));
        assert!(!looks_like_email("a b@c.co"));
    }
}
