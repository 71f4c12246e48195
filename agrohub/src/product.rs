//! Product listings offered by farmers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::MarketResult;
use crate::types::{
    ImageUrl, JariSize, Money, PersonName, PhoneNumber, ProductId, ProductKind, ProductName,
    StockKg, UserId,
};

/// Produce a farmer offers by the kilogram.
///
/// `quantity_kg` only ever changes through order placement, and never
/// drops below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Assigned by the store.
    pub id: ProductId,
    /// The selling farmer.
    pub farmer_id: UserId,
    /// Display name.
    pub name: ProductName,
    /// `jari` or `mushroom`, serialized as `type`.
    #[serde(rename = "type")]
    pub kind: ProductKind,
    /// Picture URL.
    pub image: ImageUrl,
    /// Kilograms still for sale.
    pub quantity_kg: StockKg,
    /// Price of one kilogram.
    pub rate_per_kg: Money,
    /// Grade of jari, where it applies.
    pub jari_size: Option<JariSize>,
    /// When the produce is expected to be ready.
    pub expected_delivery: Option<NaiveDate>,
    /// Copied from the farmer's profile at listing time.
    pub farmer_phone_number: PhoneNumber,
    /// False once the farmer withdraws the product.
    pub available: bool,
    /// Set by an admin; unverified products stay out of listings.
    pub verified_by_admin: bool,
    /// Listing time.
    pub created_at: DateTime<Utc>,
    /// Last change to the row, stock included.
    pub updated_at: DateTime<Utc>,
}

/// A product together with the name of the farmer selling it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductListing {
    /// The product row.
    #[serde(flatten)]
    pub product: Product,
    /// Given name of the seller.
    pub farmer_first_name: PersonName,
    /// Family name of the seller.
    pub farmer_last_name: PersonName,
}

/// Validated input for a new listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    /// The owning farmer.
    pub farmer_id: UserId,
    /// Display name.
    pub name: ProductName,
    /// `jari` or `mushroom`.
    pub kind: ProductKind,
    /// Picture URL.
    pub image: ImageUrl,
    /// Opening stock.
    pub quantity_kg: StockKg,
    /// Price of one kilogram.
    pub rate_per_kg: Money,
    /// Grade of jari, if any.
    pub jari_size: Option<JariSize>,
    /// When the produce is expected to be ready.
    pub expected_delivery: Option<NaiveDate>,
    /// Contact number shown to buyers.
    pub farmer_phone_number: PhoneNumber,
}

/// Listing request as submitted by a farmer.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductRequest {
    /// Display name.
    pub name: String,
    /// Product type, sent as `type`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Picture URL, also accepted as `img`.
    #[serde(alias = "img")]
    pub image: String,
    /// Opening stock in kilograms; zero is allowed.
    pub quantity_kg: i64,
    /// Rupees per kilogram, at most two decimal places.
    pub rate_per_kg: rust_decimal::Decimal,
    /// Grade of jari; blank means none.
    #[serde(default)]
    pub jari_size: Option<String>,
    /// When the produce is expected to be ready.
    #[serde(default)]
    pub expected_delivery: Option<NaiveDate>,
}

impl ProductRequest {
    /// Validates the request for `farmer_id`, whose phone number is copied
    /// onto the listing.
    pub fn validate(
        self,
        farmer_id: UserId,
        farmer_phone_number: PhoneNumber,
    ) -> MarketResult<NewProduct> {
        Ok(NewProduct {
            farmer_id,
            name: ProductName::try_new(self.name)?,
            kind: ProductKind::try_new(self.kind)?,
            image: ImageUrl::try_new(self.image)?,
            quantity_kg: StockKg::try_new(self.quantity_kg)?,
            rate_per_kg: Money::new(self.rate_per_kg)?,
            jari_size: self
                .jari_size
                .filter(|size| !size.trim().is_empty())
                .map(JariSize::try_new)
                .transpose()?,
            expected_delivery: self.expected_delivery,
            farmer_phone_number,
        })
    }
}
