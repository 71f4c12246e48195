//! Turning query rows back into validated domain values.
//!
//! Every column goes through the same constructors the HTTP layer uses, so
//! a row that no longer satisfies them is reported as `Corrupt` instead of
//! leaking into the services.

use std::fmt::Display;

use agrohub::errors::{Operation, StoreError, StoreResult};
use agrohub::order::{DeliveryDetails, Order, OrderStatus, OrderView, Party, ProductBrief};
use agrohub::product::{Product, ProductListing};
use agrohub::types::{
    AadharNumber, AddressLine, AdminId, AdminUsername, CityName, DeliveryMode, Email, FarmSize,
    ImageUrl, JariSize, Money, OrderId, PersonName, PhoneNumber, PinCode, ProductId, ProductKind,
    ProductName, QuantityKg, StateName, StockKg, UserId,
};
use agrohub::user::{AdminAccount, BuyerProfile, FarmerProfile, Location, Role, RoleKind, User};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{Decode, Postgres, Row, Type};

use crate::map_sqlx_error;

pub(crate) const USER_SELECT: &str = "
    SELECT u.id, u.first_name, u.last_name, u.email, u.phone_number, u.aadhar_number,
           u.image, u.user_type, u.created_at, u.updated_at, u.last_login_at,
           f.farm_size, f.approved,
           COALESCE(f.address, b.address) AS address,
           COALESCE(f.city, b.city) AS city,
           COALESCE(f.state, b.state) AS state,
           COALESCE(f.pin_code, b.pin_code) AS pin_code
    FROM users u
    LEFT JOIN farmers f ON f.user_id = u.id
    LEFT JOIN buyers b ON b.user_id = u.id";

pub(crate) const PRODUCT_SELECT: &str = "
    SELECT p.id, p.farmer_id, p.name, p.kind, p.image, p.quantity_kg, p.rate_per_kg,
           p.jari_size, p.expected_delivery, p.farmer_phone_number, p.available,
           p.verified_by_admin, p.created_at, p.updated_at,
           u.first_name AS farmer_first_name, u.last_name AS farmer_last_name
    FROM products p
    JOIN users u ON u.id = p.farmer_id";

pub(crate) const ORDER_COLUMNS: &str = "
    id, buyer_id, product_id, quantity_kg, total_price, status, delivery_address,
    delivery_city, delivery_pin_code, contact_phone, mode_of_delivery,
    expected_delivery_date, created_at, updated_at";

pub(crate) const ORDER_VIEW_SELECT: &str = "
    SELECT o.id, o.buyer_id, o.product_id, o.quantity_kg, o.total_price, o.status,
           o.delivery_address, o.delivery_city, o.delivery_pin_code, o.contact_phone,
           o.mode_of_delivery, o.expected_delivery_date, o.created_at, o.updated_at,
           p.name AS product_name, p.image AS product_image, p.farmer_id,
           b.first_name AS buyer_first_name, b.last_name AS buyer_last_name,
           b.phone_number AS buyer_phone_number,
           f.first_name AS farmer_first_name, f.last_name AS farmer_last_name,
           f.phone_number AS farmer_phone_number
    FROM orders o
    JOIN products p ON p.id = o.product_id
    JOIN users b ON b.id = o.buyer_id
    JOIN users f ON f.id = p.farmer_id";

fn column<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(name)
        .map_err(|error| map_sqlx_error(error, Operation::DecodeRow))
}

fn valid<T, E: Display>(entity: &'static str, result: Result<T, E>) -> StoreResult<T> {
    result.map_err(|error| StoreError::Corrupt {
        entity,
        detail: error.to_string(),
    })
}

fn present<T>(entity: &'static str, name: &str, value: Option<T>) -> StoreResult<T> {
    value.ok_or_else(|| StoreError::Corrupt {
        entity,
        detail: format!("{name} is missing"),
    })
}

fn text<T, E: Display>(
    row: &PgRow,
    entity: &'static str,
    name: &str,
    make: impl FnOnce(String) -> Result<T, E>,
) -> StoreResult<T> {
    valid(entity, make(column::<String>(row, name)?))
}

fn optional_text<T, E: Display>(
    row: &PgRow,
    entity: &'static str,
    name: &str,
    make: impl FnOnce(String) -> Result<T, E>,
) -> StoreResult<Option<T>> {
    column::<Option<String>>(row, name)?
        .map(|value| valid(entity, make(value)))
        .transpose()
}

/// A text column from an outer join that must be present for this row.
fn joined_text<T, E: Display>(
    row: &PgRow,
    entity: &'static str,
    name: &str,
    make: impl FnOnce(String) -> Result<T, E>,
) -> StoreResult<T> {
    let value = present(entity, name, column::<Option<String>>(row, name)?)?;
    valid(entity, make(value))
}

pub(crate) fn user_id(row: &PgRow, name: &str) -> StoreResult<UserId> {
    valid("user", UserId::try_new(column(row, name)?))
}

pub(crate) fn product_id(row: &PgRow, name: &str) -> StoreResult<ProductId> {
    valid("product", ProductId::try_new(column(row, name)?))
}

pub(crate) fn order_id(row: &PgRow, name: &str) -> StoreResult<OrderId> {
    valid("order", OrderId::try_new(column(row, name)?))
}

pub(crate) fn timestamp(row: &PgRow, name: &str) -> StoreResult<chrono::DateTime<chrono::Utc>> {
    column(row, name)
}

pub(crate) fn user(row: &PgRow) -> StoreResult<User> {
    const ENTITY: &str = "user";

    let location = Location {
        address: joined_text(row, ENTITY, "address", AddressLine::try_new)?,
        city: joined_text(row, ENTITY, "city", CityName::try_new)?,
        state: joined_text(row, ENTITY, "state", StateName::try_new)?,
        pin_code: joined_text(row, ENTITY, "pin_code", PinCode::try_new)?,
    };

    let user_type: String = column(row, "user_type")?;
    let role = match valid(ENTITY, user_type.parse::<RoleKind>())? {
        RoleKind::Farmer => Role::Farmer(FarmerProfile {
            farm_size: valid(
                ENTITY,
                FarmSize::try_new(present(
                    ENTITY,
                    "farm_size",
                    column::<Option<Decimal>>(row, "farm_size")?,
                )?),
            )?,
            location,
            approved: present(ENTITY, "approved", column::<Option<bool>>(row, "approved")?)?,
        }),
        RoleKind::Buyer => Role::Buyer(BuyerProfile { location }),
    };

    Ok(User {
        id: user_id(row, "id")?,
        first_name: text(row, ENTITY, "first_name", PersonName::try_new)?,
        last_name: text(row, ENTITY, "last_name", PersonName::try_new)?,
        email: text(row, ENTITY, "email", Email::try_new)?,
        phone_number: text(row, ENTITY, "phone_number", PhoneNumber::try_new)?,
        aadhar_number: text(row, ENTITY, "aadhar_number", AadharNumber::try_new)?,
        image: optional_text(row, ENTITY, "image", ImageUrl::try_new)?,
        role,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
        last_login_at: column(row, "last_login_at")?,
    })
}

pub(crate) fn admin(row: &PgRow) -> StoreResult<AdminAccount> {
    Ok(AdminAccount {
        id: valid("admin", AdminId::try_new(column(row, "id")?))?,
        username: text(row, "admin", "username", AdminUsername::try_new)?,
        password_digest: column(row, "password_digest")?,
    })
}

pub(crate) fn listing(row: &PgRow) -> StoreResult<ProductListing> {
    const ENTITY: &str = "product";

    let product = Product {
        id: product_id(row, "id")?,
        farmer_id: user_id(row, "farmer_id")?,
        name: text(row, ENTITY, "name", ProductName::try_new)?,
        kind: text(row, ENTITY, "kind", ProductKind::try_new)?,
        image: text(row, ENTITY, "image", ImageUrl::try_new)?,
        quantity_kg: valid(ENTITY, StockKg::try_new(column(row, "quantity_kg")?))?,
        rate_per_kg: valid(ENTITY, Money::new(column(row, "rate_per_kg")?))?,
        jari_size: optional_text(row, ENTITY, "jari_size", JariSize::try_new)?,
        expected_delivery: column(row, "expected_delivery")?,
        farmer_phone_number: text(row, ENTITY, "farmer_phone_number", PhoneNumber::try_new)?,
        available: column(row, "available")?,
        verified_by_admin: column(row, "verified_by_admin")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    };

    Ok(ProductListing {
        product,
        farmer_first_name: text(row, ENTITY, "farmer_first_name", PersonName::try_new)?,
        farmer_last_name: text(row, ENTITY, "farmer_last_name", PersonName::try_new)?,
    })
}

pub(crate) fn order(row: &PgRow) -> StoreResult<Order> {
    const ENTITY: &str = "order";

    let status: String = column(row, "status")?;
    Ok(Order {
        id: order_id(row, "id")?,
        buyer_id: user_id(row, "buyer_id")?,
        product_id: product_id(row, "product_id")?,
        quantity_kg: valid(ENTITY, QuantityKg::try_new(column(row, "quantity_kg")?))?,
        total_price: valid(ENTITY, Money::new(column(row, "total_price")?))?,
        status: valid(ENTITY, status.parse::<OrderStatus>())?,
        delivery: DeliveryDetails {
            address: text(row, ENTITY, "delivery_address", AddressLine::try_new)?,
            city: text(row, ENTITY, "delivery_city", CityName::try_new)?,
            pin_code: text(row, ENTITY, "delivery_pin_code", PinCode::try_new)?,
            contact_phone: optional_text(row, ENTITY, "contact_phone", PhoneNumber::try_new)?,
            mode: optional_text(row, ENTITY, "mode_of_delivery", DeliveryMode::try_new)?,
            expected_date: column(row, "expected_delivery_date")?,
        },
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub(crate) fn order_view(row: &PgRow) -> StoreResult<OrderView> {
    const ENTITY: &str = "order";

    let order = order(row)?;
    let product = ProductBrief {
        id: order.product_id,
        name: text(row, ENTITY, "product_name", ProductName::try_new)?,
        image: text(row, ENTITY, "product_image", ImageUrl::try_new)?,
    };
    let buyer = Party {
        user_id: order.buyer_id,
        first_name: text(row, ENTITY, "buyer_first_name", PersonName::try_new)?,
        last_name: text(row, ENTITY, "buyer_last_name", PersonName::try_new)?,
        phone_number: text(row, ENTITY, "buyer_phone_number", PhoneNumber::try_new)?,
    };
    let farmer = Party {
        user_id: user_id(row, "farmer_id")?,
        first_name: text(row, ENTITY, "farmer_first_name", PersonName::try_new)?,
        last_name: text(row, ENTITY, "farmer_last_name", PersonName::try_new)?,
        phone_number: text(row, ENTITY, "farmer_phone_number", PhoneNumber::try_new)?,
    };

    Ok(OrderView {
        order,
        product,
        buyer,
        farmer,
    })
}
