//! Builders for realistic marketplace records.
//!
//! Identifiers that must be unique (email, Aadhar number) are randomized so
//! tests can share one database and run in parallel.

use std::collections::HashMap;

use agrohub::auth::{CodeSender, DeliveryError, VerificationCode};
use agrohub::order::{DeliveryDetails, OrderDraft, OrderRequest};
use agrohub::product::{NewProduct, Product, ProductRequest};
use agrohub::types::{
    AadharNumber, AddressLine, CityName, Email, FarmSize, ImageUrl, Money, PersonName,
    PhoneNumber, PinCode, ProductKind, ProductName, QuantityKg, StateName, StockKg,
};
use agrohub::user::{BuyerProfile, FarmerProfile, Location, Registration, Role, User};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use uuid::Uuid;

/// An email address no other test uses.
pub fn unique_email(label: &str) -> Email {
    let label: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '.' })
        .collect();
    Email::try_new(format!("{label}.{}@agrohub.test", Uuid::now_v7().simple()))
        .expect("generated email is valid")
}

/// A random twelve digit Aadhar number.
pub fn unique_aadhar() -> AadharNumber {
    let digits: u64 = rand::rng().random_range(100_000_000_000..1_000_000_000_000);
    AadharNumber::try_new(digits.to_string()).expect("generated aadhar number is valid")
}

pub fn location(city: &str, pin_code: &str) -> Location {
    Location {
        address: AddressLine::try_new(format!("14 Mandi Road, {city}")).expect("valid address"),
        city: CityName::try_new(city.to_string()).expect("valid city"),
        state: StateName::try_new("Maharashtra".to_string()).expect("valid state"),
        pin_code: PinCode::try_new(pin_code.to_string()).expect("valid pin code"),
    }
}

fn registration(label: &str, first_name: &str, role: Role) -> Registration {
    Registration {
        first_name: PersonName::try_new(first_name.to_string()).expect("valid first name"),
        last_name: PersonName::try_new("Deshmukh".to_string()).expect("valid last name"),
        email: unique_email(label),
        phone_number: PhoneNumber::try_new("9822098220".to_string()).expect("valid phone"),
        aadhar_number: unique_aadhar(),
        image: None,
        role,
    }
}

/// A farmer with a small farm near Nashik, not yet approved.
pub fn farmer_registration(label: &str) -> Registration {
    registration(
        label,
        "Sunita",
        Role::Farmer(FarmerProfile {
            farm_size: FarmSize::try_new(Decimal::new(45, 1)).expect("valid farm size"),
            location: location("Nashik", "422001"),
            approved: false,
        }),
    )
}

/// A buyer based in Pune.
pub fn buyer_registration(label: &str) -> Registration {
    registration(
        label,
        "Vikram",
        Role::Buyer(BuyerProfile {
            location: location("Pune", "411001"),
        }),
    )
}

/// A mushroom listing by `farmer` with the given stock and per-kilogram rate.
pub fn new_product(farmer: &User, stock_kg: i64, rate_per_kg: Decimal) -> NewProduct {
    new_product_of_kind(farmer, "Mushroom", stock_kg, rate_per_kg)
}

pub fn new_product_of_kind(
    farmer: &User,
    kind: &str,
    stock_kg: i64,
    rate_per_kg: Decimal,
) -> NewProduct {
    NewProduct {
        farmer_id: farmer.id,
        name: ProductName::try_new(format!("Fresh {kind}")).expect("valid product name"),
        kind: ProductKind::try_new(kind.to_string()).expect("valid product kind"),
        image: ImageUrl::try_new(format!("https://img.agrohub.test/{}.jpg", Uuid::now_v7()))
            .expect("valid image url"),
        quantity_kg: StockKg::try_new(stock_kg).expect("valid stock"),
        rate_per_kg: Money::new(rate_per_kg).expect("valid rate"),
        jari_size: None,
        expected_delivery: None,
        farmer_phone_number: farmer.phone_number.clone(),
    }
}

/// The body a farmer would post to list a product.
pub fn product_request(kind: &str, stock_kg: i64, rate_per_kg: Decimal) -> ProductRequest {
    ProductRequest {
        name: format!("Fresh {kind}"),
        kind: kind.to_string(),
        image: "https://img.agrohub.test/listing.jpg".to_string(),
        quantity_kg: stock_kg,
        rate_per_kg,
        jari_size: None,
        expected_delivery: None,
    }
}

/// The body a buyer would post to order `quantity_kg` kilograms.
pub fn order_request(quantity_kg: i64) -> OrderRequest {
    OrderRequest {
        quantity_kg,
        delivery_address: "Flat 7, Aundh".to_string(),
        delivery_city: "Pune".to_string(),
        delivery_pin_code: "411007".to_string(),
        contact_phone: None,
        mode_of_delivery: Some("courier".to_string()),
        expected_delivery_date: None,
    }
}

pub fn delivery() -> DeliveryDetails {
    let (_, delivery) = order_request(1)
        .validate()
        .expect("fixture order request is valid");
    delivery
}

/// A draft priced at the product's current rate, the way the order desk
/// builds it.
pub fn draft(buyer: &User, product: &Product, quantity_kg: i64) -> OrderDraft {
    let quantity = QuantityKg::try_new(quantity_kg).expect("valid quantity");
    OrderDraft {
        buyer_id: buyer.id,
        product_id: product.id,
        quantity_kg: quantity,
        rate_per_kg: product.rate_per_kg,
        total_price: product
            .rate_per_kg
            .times(quantity)
            .expect("fixture total fits"),
        delivery: delivery(),
    }
}

/// Records every code it is asked to send, instead of sending it.
#[derive(Debug, Default)]
pub struct CapturingCodeSender {
    sent: Mutex<HashMap<String, String>>,
}

impl CapturingCodeSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent code sent to `email`.
    pub fn last_code(&self, email: &str) -> Option<String> {
        let email = email.trim().to_lowercase();
        self.sent.lock().get(&email).cloned()
    }
}

#[async_trait]
impl CodeSender for CapturingCodeSender {
    async fn send_code(
        &self,
        destination: &Email,
        code: &VerificationCode,
    ) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .insert(destination.to_string(), code.as_str().to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_emails_differ() {
        assert_ne!(unique_email("buyer"), unique_email("buyer"));
    }

    #[test]
    fn labels_are_made_email_safe() {
        let email = unique_email("Place Order/Race");
        assert!(email.as_ref().starts_with("place.order.race."));
    }

    #[tokio::test]
    async fn capturing_sender_keeps_latest_code() {
        let sender = CapturingCodeSender::new();
        let email = Email::try_new("Kisan@Agrohub.test".to_string()).expect("valid email");
        let first = VerificationCode::generate();
        let second = VerificationCode::generate();

        sender.send_code(&email, &first).await.expect("send succeeds");
        sender.send_code(&email, &second).await.expect("send succeeds");

        assert_eq!(
            sender.last_code("kisan@agrohub.test").as_deref(),
            Some(second.as_str())
        );
    }
}
