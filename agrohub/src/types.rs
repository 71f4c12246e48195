//! Validated value types shared by every layer of the marketplace.
//!
//! Values are parsed once at the edge (HTTP payloads, database rows) and
//! carried as these types afterwards, so the services never see an empty
//! address, a negative stock level or a price with sub-paisa precision.

use std::fmt::Display;

use nutype::nutype;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a registered farmer or buyer.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct UserId(i64);

/// Identifier of an administrator account.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct AdminId(i64);

/// Identifier of a product listing.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct ProductId(i64);

/// Identifier of a placed order.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct OrderId(i64);

/// Email address used as the destination for verification codes.
#[nutype(
    sanitize(trim, lowercase),
    validate(
        not_empty,
        len_char_max = 255,
        regex = r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$"
    ),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct Email(String);

/// Twelve digit Aadhar identity number.
#[nutype(
    sanitize(with = |s: String| s.chars().filter(|c| !c.is_whitespace()).collect()),
    validate(predicate = |s: &str| s.len() == 12 && s.chars().all(|c| c.is_ascii_digit())),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct AadharNumber(String);

/// Contact phone number in international form.
///
/// Bare ten digit numbers are taken to be Indian mobile numbers and get the
/// `+91` prefix. Spaces and dashes are dropped.
#[nutype(
    sanitize(with = |raw: String| normalize_phone_number(raw)),
    validate(predicate = |s: &str| is_phone_number(s)),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct PhoneNumber(String);

fn normalize_phone_number(raw: String) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    if compact.len() == 10 && compact.chars().all(|c| c.is_ascii_digit()) {
        format!("+91{compact}")
    } else {
        compact
    }
}

fn is_phone_number(candidate: &str) -> bool {
    let digits = candidate.strip_prefix('+').unwrap_or(candidate);
    (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// Six digit Indian postal code.
#[nutype(
    sanitize(trim),
    validate(predicate = |s: &str| s.len() == 6 && s.chars().all(|c| c.is_ascii_digit())),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct PinCode(String);

/// First or last name of a person.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 100),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct PersonName(String);

/// Street address line used for farms, buyers and deliveries.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 500),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct AddressLine(String);

/// City or town name.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 100),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct CityName(String);

/// Indian state name.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 100),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct StateName(String);

/// Display name of a product listing.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct ProductName(String);

/// Produce category such as `Jari` or `Mushroom`.
///
/// Stored as entered; category filters compare case-insensitively.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 100),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct ProductKind(String);

impl ProductKind {
    /// Returns true when both kinds name the same category, ignoring case.
    pub fn matches(&self, other: &str) -> bool {
        self.as_ref().eq_ignore_ascii_case(other.trim())
    }
}

/// Grade of jari produce, free text such as `medium`.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 50),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct JariSize(String);

/// Location of an uploaded image.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 2048),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct ImageUrl(String);

/// Free text delivery mode such as `pickup` or `courier`.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 100),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct DeliveryMode(String);

/// Login name of an administrator.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct AdminUsername(String);

/// Farm area in acres.
#[nutype(
    validate(predicate = |acres: &Decimal| *acres >= Decimal::ZERO),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Display,
        Into,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct FarmSize(Decimal);

/// Kilograms requested by a single order. Always at least one.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct QuantityKg(i64);

/// Kilograms of a product still available for sale. Never negative.
#[nutype(
    validate(greater_or_equal = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct StockKg(i64);

impl StockKg {
    /// Returns true when this stock can cover `quantity` in full.
    pub fn covers(self, quantity: QuantityKg) -> bool {
        self.into_inner() >= quantity.into_inner()
    }

    /// Stock left after selling `quantity`, or `None` if it would go negative.
    pub fn after_sale(self, quantity: QuantityKg) -> Option<Self> {
        self.into_inner()
            .checked_sub(quantity.into_inner())
            .and_then(|remaining| Self::try_new(remaining).ok())
    }
}

/// Why a decimal amount was rejected as [`Money`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Below zero.
    #[error("amount cannot be negative: {0}")]
    Negative(Decimal),
    /// Finer than one paisa.
    #[error("amount cannot have more than 2 decimal places: {0}")]
    TooPrecise(Decimal),
    /// Beyond [`Money::MAX_AMOUNT`].
    #[error("amount {0} exceeds the maximum of {max}", max = Money::MAX_AMOUNT)]
    TooLarge(Decimal),
}

/// Rupee amount with at most two decimal places.
///
/// Used both for per-kilogram rates and order totals. Multiplying a rate by
/// a whole number of kilograms never needs rounding, so totals are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Largest amount the `NUMERIC(12, 2)` columns can hold.
    pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

    /// Checks sign, precision and range.
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative(amount));
        }
        if amount.normalize().scale() > 2 {
            return Err(MoneyError::TooPrecise(amount));
        }
        if amount > Self::MAX_AMOUNT {
            return Err(MoneyError::TooLarge(amount));
        }
        Ok(Self(amount))
    }

    /// The amount in rupees.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` kilograms at this per-kilogram rate.
    pub fn times(self, quantity: QuantityKg) -> Result<Self, MoneyError> {
        let total = self
            .0
            .checked_mul(Decimal::from(quantity.into_inner()))
            .ok_or(MoneyError::TooLarge(Self::MAX_AMOUNT))?;
        Self::new(total)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "₹{:.2}", self.0)
    }
}
