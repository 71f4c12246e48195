use agrohub::errors::{Operation, Resource, StoreError, StoreResult};
use agrohub::order::{Order, OrderDraft, OrderStatus, OrderView, PlacedOrder};
use agrohub::product::{NewProduct, Product, ProductListing};
use agrohub::store::{AdminStore, MarketStore, OrderStore, ProductStore, UserStore};
use agrohub::types::{
    AadharNumber, AdminUsername, Email, OrderId, PhoneNumber, ProductId, ProductKind, UserId,
};
use agrohub::user::{AdminAccount, Registration, Role, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{query, Row};
use tracing::{debug, info, instrument, warn};

use crate::rows::{
    self, ORDER_COLUMNS, ORDER_VIEW_SELECT, PRODUCT_SELECT, USER_SELECT,
};
use crate::{is_foreign_key_violation, is_unique_violation, map_sqlx_error, PostgresMarketStore};

fn text<T: AsRef<str>>(value: &T) -> &str {
    value.as_ref()
}

fn optional_text<T: AsRef<str>>(value: Option<&T>) -> Option<&str> {
    value.map(AsRef::as_ref)
}

fn require_row(rows_affected: u64, missing: Resource) -> StoreResult<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound(missing))
    } else {
        Ok(())
    }
}

#[async_trait]
impl UserStore for PostgresMarketStore {
    #[instrument(name = "postgres.create_user", skip_all)]
    async fn create_user(&self, registration: Registration) -> StoreResult<User> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::BeginTransaction))?;

        let row = query(
            "INSERT INTO users
                 (first_name, last_name, email, phone_number, aadhar_number, image, user_type)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(text(&registration.first_name))
        .bind(text(&registration.last_name))
        .bind(text(&registration.email))
        .bind(text(&registration.phone_number))
        .bind(text(&registration.aadhar_number))
        .bind(optional_text(registration.image.as_ref()))
        .bind(registration.role.kind().as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                StoreError::Duplicate("email or aadhar number")
            } else {
                map_sqlx_error(error, Operation::WriteUser)
            }
        })?;
        let id = rows::user_id(&row, "id")?;

        let profile = match &registration.role {
            Role::Farmer(farmer) => query(
                "INSERT INTO farmers (user_id, farm_size, address, city, state, pin_code, approved)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(id.into_inner())
            .bind(farmer.farm_size.into_inner())
            .bind(text(&farmer.location.address))
            .bind(text(&farmer.location.city))
            .bind(text(&farmer.location.state))
            .bind(text(&farmer.location.pin_code))
            .bind(farmer.approved),
            Role::Buyer(buyer) => query(
                "INSERT INTO buyers (user_id, address, city, state, pin_code)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(id.into_inner())
            .bind(text(&buyer.location.address))
            .bind(text(&buyer.location.city))
            .bind(text(&buyer.location.state))
            .bind(text(&buyer.location.pin_code)),
        };
        profile
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::WriteUser))?;

        let row = query(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(id.into_inner())
            .fetch_one(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadUser))?;
        let user = rows::user(&row)?;

        tx.commit()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::CommitTransaction))?;

        info!(
            user = %user.id,
            user_type = user.role.kind().as_str(),
            "[postgres.create_user] user stored"
        );
        Ok(user)
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        query(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadUser))?
            .map(|row| rows::user(&row))
            .transpose()
    }

    async fn user_by_email(&self, email: &Email) -> StoreResult<Option<User>> {
        query(&format!("{USER_SELECT} WHERE u.email = $1"))
            .bind(text(email))
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadUser))?
            .map(|row| rows::user(&row))
            .transpose()
    }

    async fn identity_taken(&self, email: &Email, aadhar: &AadharNumber) -> StoreResult<bool> {
        let row = query(
            "SELECT EXISTS (
                 SELECT 1 FROM users WHERE email = $1 OR aadhar_number = $2
             ) AS taken",
        )
        .bind(text(email))
        .bind(text(aadhar))
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::ReadUser))?;
        row.try_get("taken")
            .map_err(|error| map_sqlx_error(error, Operation::DecodeRow))
    }

    #[instrument(name = "postgres.update_phone_number", skip(self, phone))]
    async fn update_phone_number(&self, id: UserId, phone: PhoneNumber) -> StoreResult<User> {
        let result = query("UPDATE users SET phone_number = $2, updated_at = now() WHERE id = $1")
            .bind(id.into_inner())
            .bind(text(&phone))
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::WriteUser))?;
        require_row(result.rows_affected(), Resource::User(id))?;

        self.user(id)
            .await?
            .ok_or(StoreError::NotFound(Resource::User(id)))
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<()> {
        let result = query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id.into_inner())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::WriteUser))?;
        require_row(result.rows_affected(), Resource::User(id))
    }

    async fn unapproved_farmers(&self) -> StoreResult<Vec<User>> {
        query(&format!(
            "{USER_SELECT} WHERE u.user_type = 'farmer' AND NOT f.approved
             ORDER BY u.created_at ASC, u.id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::ReadUser))?
        .iter()
        .map(rows::user)
        .collect()
    }

    #[instrument(name = "postgres.approve_farmer", skip(self))]
    async fn approve_farmer(&self, id: UserId) -> StoreResult<()> {
        let result = query(
            "WITH approved AS (
                 UPDATE farmers SET approved = TRUE WHERE user_id = $1 RETURNING user_id
             )
             UPDATE users SET updated_at = now() WHERE id IN (SELECT user_id FROM approved)",
        )
        .bind(id.into_inner())
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::WriteUser))?;
        require_row(result.rows_affected(), Resource::Farmer(id))
    }
}

#[async_trait]
impl AdminStore for PostgresMarketStore {
    async fn upsert_admin(
        &self,
        username: AdminUsername,
        password_digest: String,
    ) -> StoreResult<AdminAccount> {
        let row = query(
            "INSERT INTO admins (username, password_digest) VALUES ($1, $2)
             ON CONFLICT (username) DO UPDATE
                 SET password_digest = EXCLUDED.password_digest, updated_at = now()
             RETURNING id, username, password_digest",
        )
        .bind(text(&username))
        .bind(&password_digest)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::WriteAdmin))?;
        rows::admin(&row)
    }

    async fn admin_by_username(
        &self,
        username: &AdminUsername,
    ) -> StoreResult<Option<AdminAccount>> {
        query("SELECT id, username, password_digest FROM admins WHERE username = $1")
            .bind(text(username))
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadAdmin))?
            .map(|row| rows::admin(&row))
            .transpose()
    }
}

#[async_trait]
impl ProductStore for PostgresMarketStore {
    #[instrument(name = "postgres.create_product", skip_all, fields(farmer = %product.farmer_id))]
    async fn create_product(&self, product: NewProduct) -> StoreResult<Product> {
        // Selecting from farmers makes a missing or non-farmer owner insert nothing.
        let row = query(
            "INSERT INTO products
                 (farmer_id, name, kind, image, quantity_kg, rate_per_kg, jari_size,
                  expected_delivery, farmer_phone_number)
             SELECT user_id, $2, $3, $4, $5, $6, $7, $8, $9 FROM farmers WHERE user_id = $1
             RETURNING id, available, verified_by_admin, created_at, updated_at",
        )
        .bind(product.farmer_id.into_inner())
        .bind(text(&product.name))
        .bind(text(&product.kind))
        .bind(text(&product.image))
        .bind(product.quantity_kg.into_inner())
        .bind(product.rate_per_kg.amount())
        .bind(optional_text(product.jari_size.as_ref()))
        .bind(product.expected_delivery)
        .bind(text(&product.farmer_phone_number))
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::WriteProduct))?
        .ok_or(StoreError::NotFound(Resource::Farmer(product.farmer_id)))?;

        let id = rows::product_id(&row, "id")?;
        debug!(product = %id, "[postgres.create_product] product stored");
        Ok(Product {
            id,
            farmer_id: product.farmer_id,
            name: product.name,
            kind: product.kind,
            image: product.image,
            quantity_kg: product.quantity_kg,
            rate_per_kg: product.rate_per_kg,
            jari_size: product.jari_size,
            expected_delivery: product.expected_delivery,
            farmer_phone_number: product.farmer_phone_number,
            available: row
                .try_get("available")
                .map_err(|error| map_sqlx_error(error, Operation::DecodeRow))?,
            verified_by_admin: row
                .try_get("verified_by_admin")
                .map_err(|error| map_sqlx_error(error, Operation::DecodeRow))?,
            created_at: rows::timestamp(&row, "created_at")?,
            updated_at: rows::timestamp(&row, "updated_at")?,
        })
    }

    async fn product(&self, id: ProductId) -> StoreResult<Option<ProductListing>> {
        query(&format!("{PRODUCT_SELECT} WHERE p.id = $1"))
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadProduct))?
            .map(|row| rows::listing(&row))
            .transpose()
    }

    async fn verified_listings(
        &self,
        kind: Option<ProductKind>,
    ) -> StoreResult<Vec<ProductListing>> {
        query(&format!(
            "{PRODUCT_SELECT}
             WHERE p.verified_by_admin AND p.available
               AND ($1::TEXT IS NULL OR lower(p.kind) = lower($1))
             ORDER BY p.created_at DESC, p.id DESC"
        ))
        .bind(optional_text(kind.as_ref()))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::ReadProduct))?
        .iter()
        .map(rows::listing)
        .collect()
    }

    async fn farmer_products(&self, farmer_id: UserId) -> StoreResult<Vec<ProductListing>> {
        query(&format!(
            "{PRODUCT_SELECT} WHERE p.farmer_id = $1 ORDER BY p.created_at DESC, p.id DESC"
        ))
        .bind(farmer_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::ReadProduct))?
        .iter()
        .map(rows::listing)
        .collect()
    }

    async fn set_available(&self, id: ProductId, available: bool) -> StoreResult<()> {
        let result =
            query("UPDATE products SET available = $2, updated_at = now() WHERE id = $1")
                .bind(id.into_inner())
                .bind(available)
                .execute(&self.pool)
                .await
                .map_err(|error| map_sqlx_error(error, Operation::WriteProduct))?;
        require_row(result.rows_affected(), Resource::Product(id))
    }

    async fn approve_product(&self, id: ProductId) -> StoreResult<()> {
        let result = query(
            "UPDATE products SET verified_by_admin = TRUE, updated_at = now() WHERE id = $1",
        )
        .bind(id.into_inner())
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::WriteProduct))?;
        require_row(result.rows_affected(), Resource::Product(id))
    }

    #[instrument(name = "postgres.delete_product", skip(self))]
    async fn delete_product(&self, id: ProductId) -> StoreResult<()> {
        let result = query("DELETE FROM products WHERE id = $1")
            .bind(id.into_inner())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                if is_foreign_key_violation(&error) {
                    StoreError::StillReferenced(Resource::Product(id))
                } else {
                    map_sqlx_error(error, Operation::WriteProduct)
                }
            })?;
        require_row(result.rows_affected(), Resource::Product(id))
    }
}

#[async_trait]
impl OrderStore for PostgresMarketStore {
    #[instrument(
        name = "postgres.place_order",
        skip_all,
        fields(product = %draft.product_id, quantity_kg = %draft.quantity_kg)
    )]
    async fn place_order(&self, draft: OrderDraft) -> StoreResult<PlacedOrder> {
        let requested = draft.quantity_kg.into_inner();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::BeginTransaction))?;

        let decremented = query(
            "UPDATE products
             SET quantity_kg = quantity_kg - $2, updated_at = now()
             WHERE id = $1 AND quantity_kg >= $2 AND rate_per_kg = $3
             RETURNING quantity_kg",
        )
        .bind(draft.product_id.into_inner())
        .bind(requested)
        .bind(draft.rate_per_kg.amount())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::PlaceOrder))?;

        let Some(decremented) = decremented else {
            // Nothing matched: find out why from the committed row.
            let current = query("SELECT quantity_kg, rate_per_kg FROM products WHERE id = $1")
                .bind(draft.product_id.into_inner())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|error| map_sqlx_error(error, Operation::ReadProduct))?;
            let Some(current) = current else {
                return Err(StoreError::NotFound(Resource::Product(draft.product_id)));
            };
            let available: i64 = current
                .try_get("quantity_kg")
                .map_err(|error| map_sqlx_error(error, Operation::DecodeRow))?;
            let rate: Decimal = current
                .try_get("rate_per_kg")
                .map_err(|error| map_sqlx_error(error, Operation::DecodeRow))?;

            if available < requested {
                warn!(
                    requested_kg = requested,
                    available_kg = available,
                    "[postgres.place_order] insufficient stock"
                );
                return Err(StoreError::InsufficientStock {
                    requested,
                    available,
                });
            }
            warn!(
                priced_at = %draft.rate_per_kg,
                current_rate = %rate,
                "[postgres.place_order] product changed since it was read"
            );
            return Err(StoreError::VersionConflict);
        };
        let remaining: i64 = decremented
            .try_get("quantity_kg")
            .map_err(|error| map_sqlx_error(error, Operation::DecodeRow))?;

        let row = query(
            "INSERT INTO orders
                 (buyer_id, product_id, quantity_kg, total_price, status, delivery_address,
                  delivery_city, delivery_pin_code, contact_phone, mode_of_delivery,
                  expected_delivery_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING id, created_at, updated_at",
        )
        .bind(draft.buyer_id.into_inner())
        .bind(draft.product_id.into_inner())
        .bind(requested)
        .bind(draft.total_price.amount())
        .bind(OrderStatus::Pending.as_str())
        .bind(text(&draft.delivery.address))
        .bind(text(&draft.delivery.city))
        .bind(text(&draft.delivery.pin_code))
        .bind(optional_text(draft.delivery.contact_phone.as_ref()))
        .bind(optional_text(draft.delivery.mode.as_ref()))
        .bind(draft.delivery.expected_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(|error| {
            if is_foreign_key_violation(&error) {
                StoreError::NotFound(Resource::User(draft.buyer_id))
            } else {
                map_sqlx_error(error, Operation::PlaceOrder)
            }
        })?;

        let placed = PlacedOrder {
            order_id: rows::order_id(&row, "id")?,
            total_price: draft.total_price,
            created_at: rows::timestamp(&row, "created_at")?,
            updated_at: rows::timestamp(&row, "updated_at")?,
        };

        tx.commit()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::CommitTransaction))?;

        info!(
            order = %placed.order_id,
            remaining_kg = remaining,
            "[postgres.place_order] order committed"
        );
        Ok(placed)
    }

    async fn order(&self, id: OrderId) -> StoreResult<Option<OrderView>> {
        query(&format!("{ORDER_VIEW_SELECT} WHERE o.id = $1"))
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadOrder))?
            .map(|row| rows::order_view(&row))
            .transpose()
    }

    async fn buyer_orders(&self, buyer_id: UserId) -> StoreResult<Vec<OrderView>> {
        query(&format!(
            "{ORDER_VIEW_SELECT} WHERE o.buyer_id = $1 ORDER BY o.created_at DESC, o.id DESC"
        ))
        .bind(buyer_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::ReadOrder))?
        .iter()
        .map(rows::order_view)
        .collect()
    }

    async fn farmer_orders(&self, farmer_id: UserId) -> StoreResult<Vec<OrderView>> {
        query(&format!(
            "{ORDER_VIEW_SELECT} WHERE p.farmer_id = $1 ORDER BY o.created_at DESC, o.id DESC"
        ))
        .bind(farmer_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::ReadOrder))?
        .iter()
        .map(rows::order_view)
        .collect()
    }

    #[instrument(name = "postgres.update_order_status", skip(self))]
    async fn update_order_status(&self, id: OrderId, status: OrderStatus) -> StoreResult<Order> {
        query(&format!(
            "UPDATE orders SET status = $2, updated_at = now() WHERE id = $1
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.into_inner())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::WriteOrder))?
        .map(|row| rows::order(&row))
        .transpose()?
        .ok_or(StoreError::NotFound(Resource::Order(id)))
    }
}

#[async_trait]
impl MarketStore for PostgresMarketStore {
    async fn ping(&self) -> StoreResult<()> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::Ping))?;
        Ok(())
    }
}
