//! Orders, their lifecycle status, and the joined views returned to callers.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{MarketError, MarketResult};
use crate::types::{
    AddressLine, CityName, DeliveryMode, ImageUrl, Money, OrderId, PersonName, PhoneNumber,
    PinCode, ProductId, ProductName, QuantityKg, UserId,
};

/// Lifecycle status of an order.
///
/// Transitions are triggered externally and not restricted: any status may
/// be replaced by any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Placed, not yet handled. Every order starts here.
    Pending,
    /// Being packed.
    Processing,
    /// Handed to the carrier.
    Shipped,
    /// Received by the buyer.
    Delivered,
    /// Called off before delivery.
    Cancelled,
    /// Money returned to the buyer.
    Refunded,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
        Self::Refunded,
    ];

    /// Lowercase name, as stored and sent over the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = MarketError;

    /// Accepts only the exact lowercase status names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| MarketError::InvalidStatus(s.to_string()))
    }
}

/// Where and how an order is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDetails {
    /// Street address.
    pub address: AddressLine,
    /// City of the address.
    pub city: CityName,
    /// Postal code of the address.
    pub pin_code: PinCode,
    /// Number to call about this delivery, when different from the profile.
    pub contact_phone: Option<PhoneNumber>,
    /// Carrier or pickup arrangement, free text.
    pub mode: Option<DeliveryMode>,
    /// Date the buyer expects the goods.
    pub expected_date: Option<NaiveDate>,
}

/// A buyer's order for some kilograms of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Assigned by the store at placement.
    pub id: OrderId,
    /// The buyer who placed it.
    pub buyer_id: UserId,
    /// The product ordered.
    pub product_id: ProductId,
    /// Kilograms ordered.
    pub quantity_kg: QuantityKg,
    /// Captured at placement; later price changes never touch it.
    pub total_price: Money,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Where the goods go.
    pub delivery: DeliveryDetails,
    /// When the order was placed.
    pub created_at: DateTime<Utc>,
    /// Last status change, or placement.
    pub updated_at: DateTime<Utc>,
}

/// An order ready to be committed by a store.
///
/// `rate_per_kg` is the price the total was computed from. Stores must
/// refuse the write if the product's rate no longer matches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    /// The buyer placing the order.
    pub buyer_id: UserId,
    /// The product whose stock is decremented.
    pub product_id: ProductId,
    /// Kilograms to take from stock.
    pub quantity_kg: QuantityKg,
    /// Rate observed when pricing; the write is conditional on it.
    pub rate_per_kg: Money,
    /// `rate_per_kg` times `quantity_kg`.
    pub total_price: Money,
    /// Where the goods go.
    pub delivery: DeliveryDetails,
}

/// Result of a successful placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    /// Identifier of the new order.
    pub order_id: OrderId,
    /// What the buyer owes.
    pub total_price: Money,
    /// Placement time.
    pub created_at: DateTime<Utc>,
    /// Equal to `created_at` for a fresh order.
    pub updated_at: DateTime<Utc>,
}

/// The product fields shown alongside an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductBrief {
    /// The ordered product.
    pub id: ProductId,
    /// Product name at lookup time.
    pub name: ProductName,
    /// Picture of the product.
    pub image: ImageUrl,
}

/// One side of an order: the buyer or the selling farmer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Account of this party.
    pub user_id: UserId,
    /// Given name.
    pub first_name: PersonName,
    /// Family name.
    pub last_name: PersonName,
    /// Profile phone number, for arranging delivery.
    pub phone_number: PhoneNumber,
}

/// An order joined with its product and both parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    /// The order itself.
    pub order: Order,
    /// What was ordered.
    pub product: ProductBrief,
    /// Who bought.
    pub buyer: Party,
    /// Who sells the product.
    pub farmer: Party,
}

impl OrderView {
    /// True when `user` bought or sold this order.
    pub fn involves(&self, user: UserId) -> bool {
        self.buyer.user_id == user || self.farmer.user_id == user
    }
}

/// Order request as submitted by a buyer, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    /// Kilograms wanted; must be positive.
    pub quantity_kg: i64,
    /// Street address; must not be blank.
    pub delivery_address: String,
    /// City; must not be blank.
    pub delivery_city: String,
    /// Six digit pin code, as text or a JSON number.
    #[serde(alias = "delivery_address_zip", deserialize_with = "digits")]
    pub delivery_pin_code: String,
    /// Phone for this delivery, as text or a JSON number.
    #[serde(
        default,
        alias = "buyers_phone_number",
        deserialize_with = "optional_digits"
    )]
    pub contact_phone: Option<String>,
    /// Optional carrier or pickup arrangement.
    #[serde(default)]
    pub mode_of_delivery: Option<String>,
    /// Optional `YYYY-MM-DD` date.
    #[serde(default)]
    pub expected_delivery_date: Option<NaiveDate>,
}

impl OrderRequest {
    /// Checks quantity and delivery fields without touching storage.
    pub fn validate(self) -> MarketResult<(QuantityKg, DeliveryDetails)> {
        let quantity = QuantityKg::try_new(self.quantity_kg)?;
        let delivery = DeliveryDetails {
            address: AddressLine::try_new(self.delivery_address)?,
            city: CityName::try_new(self.delivery_city)?,
            pin_code: PinCode::try_new(self.delivery_pin_code)?,
            contact_phone: non_blank(self.contact_phone)
                .map(PhoneNumber::try_new)
                .transpose()?,
            mode: non_blank(self.mode_of_delivery)
                .map(DeliveryMode::try_new)
                .transpose()?,
            expected_date: self.expected_delivery_date,
        };
        Ok((quantity, delivery))
    }
}

/// Pin codes and phone numbers arrive either as text or as bare JSON numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Digits {
    Text(String),
    Number(u64),
}

impl From<Digits> for String {
    fn from(value: Digits) -> Self {
        match value {
            Digits::Text(text) => text,
            Digits::Number(number) => number.to_string(),
        }
    }
}

fn digits<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Digits::deserialize(deserializer).map(String::from)
}

fn optional_digits<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<Digits>::deserialize(deserializer)?.map(String::from))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}
