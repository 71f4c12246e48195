//! Error taxonomy for the marketplace.
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`] is what storage backends report. It distinguishes
//!   business outcomes detected inside a transaction (not found, short
//!   stock, a concurrent writer) from infrastructure failures, which carry
//!   the [`Operation`] that broke.
//! - [`MarketError`] is what services and the HTTP layer see. Every caller
//!   visible failure maps to exactly one variant:
//!
//! | variant | meaning | caller recovery |
//! |---|---|---|
//! | `InvalidInput` | malformed or missing fields | fix the request |
//! | `InsufficientStock` | order exceeds available kilograms | order less |
//! | `NotFound` | referenced record does not exist | none |
//! | `ConflictRetry` | concurrent modification outlived our retries | retry |
//! | `InvalidStatus` | unknown order status text | fix the request |
//! | `StorageFailure` | storage could not complete the operation | none, internal |
//! | `Unauthorized` | missing or bad credentials | authenticate |
//! | `Forbidden` | authenticated but not allowed | none |
//! | `Conflict` | duplicate registration, record still in use | none |
//! | `DeliveryFailed` | the code sender refused the message | retry later |
//!
//! A failed operation never leaves partial writes behind, so none of these
//! require compensation.

use thiserror::Error;

use crate::types::{
    AadharNumberError, AddressLineError, AdminUsernameError, CityNameError, DeliveryModeError,
    EmailError, FarmSizeError, ImageUrlError, JariSizeError, MoneyError, OrderIdError,
    PersonNameError, PhoneNumberError, PinCodeError, ProductIdError, ProductKindError,
    ProductNameError, QuantityKgError, StateNameError, StockKgError, UserIdError,
};
use crate::types::{OrderId, ProductId, UserId};

/// Identifies the storage operation that failed.
///
/// Used by [`StoreError::StoreFailure`] so logs and errors name the step
/// without exposing driver messages to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Checking that the backend is reachable.
    Ping,
    /// Beginning a database transaction.
    BeginTransaction,
    /// Committing a database transaction.
    CommitTransaction,
    /// Reading user, farmer or buyer rows.
    ReadUser,
    /// Creating or updating user rows.
    WriteUser,
    /// Reading admin accounts.
    ReadAdmin,
    /// Creating or updating admin accounts.
    WriteAdmin,
    /// Reading product rows.
    ReadProduct,
    /// Creating, updating or deleting product rows.
    WriteProduct,
    /// Decrementing stock and inserting an order.
    PlaceOrder,
    /// Reading order rows.
    ReadOrder,
    /// Updating order rows.
    WriteOrder,
    /// Reading expiring entries.
    ReadEntry,
    /// Writing or deleting expiring entries.
    WriteEntry,
    /// Turning a stored row into a domain value.
    DecodeRow,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ping => "ping",
            Self::BeginTransaction => "begin_transaction",
            Self::CommitTransaction => "commit_transaction",
            Self::ReadUser => "read_user",
            Self::WriteUser => "write_user",
            Self::ReadAdmin => "read_admin",
            Self::WriteAdmin => "write_admin",
            Self::ReadProduct => "read_product",
            Self::WriteProduct => "write_product",
            Self::PlaceOrder => "place_order",
            Self::ReadOrder => "read_order",
            Self::WriteOrder => "write_order",
            Self::ReadEntry => "read_entry",
            Self::WriteEntry => "write_entry",
            Self::DecodeRow => "decode_row",
        };
        f.write_str(name)
    }
}

/// A record that an operation referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// A farmer or buyer account.
    User(UserId),
    /// A user that must be a farmer.
    Farmer(UserId),
    /// A product listing.
    Product(ProductId),
    /// An order.
    Order(OrderId),
    /// Account looked up by email or username; the key is not echoed back.
    Account,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user {id}"),
            Self::Farmer(id) => write!(f, "farmer {id}"),
            Self::Product(id) => write!(f, "product {id}"),
            Self::Order(id) => write!(f, "order {id}"),
            Self::Account => write!(f, "account"),
        }
    }
}

/// Error type returned by storage backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(Resource),

    /// The conditional stock decrement matched no row because the product
    /// holds fewer kilograms than requested.
    #[error("insufficient stock: requested {requested} kg, available {available} kg")]
    InsufficientStock {
        /// Kilograms the order asked for.
        requested: i64,
        /// Kilograms the product held.
        available: i64,
    },

    /// The row changed between the read and the conditional write, or the
    /// database aborted the transaction as a serialization failure.
    #[error("version conflict detected")]
    VersionConflict,

    /// A unique identifier (email, Aadhar number, username) is taken.
    #[error("{0} is already registered")]
    Duplicate(&'static str),

    /// Deleting the record would orphan rows that point at it.
    #[error("{0} is still referenced by other records")]
    StillReferenced(Resource),

    /// A stored row no longer passes domain validation.
    #[error("stored {entity} could not be decoded: {detail}")]
    Corrupt {
        /// Kind of record, such as `"product"`.
        entity: &'static str,
        /// What failed to validate.
        detail: String,
    },

    /// Infrastructure failure surfaced by the backing store.
    #[error("{operation} operation failed")]
    StoreFailure {
        /// The step that failed.
        operation: Operation,
    },
}

/// Convenience alias for storage results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Why a caller was refused authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No bearer token was sent.
    MissingCredentials,
    /// The token is malformed, unknown or expired.
    InvalidSession,
    /// The one-time code is wrong, used up or expired.
    InvalidCode,
    /// Admin username or password is wrong.
    InvalidCredentials,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredentials => write!(f, "missing bearer token"),
            Self::InvalidSession => write!(f, "session is invalid or has expired"),
            Self::InvalidCode => write!(f, "verification code is invalid or has expired"),
            Self::InvalidCredentials => write!(f, "invalid username or password"),
        }
    }
}

/// Errors surfaced by marketplace services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    /// A field is malformed or missing. Nothing was written.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The order asks for more kilograms than the product holds.
    #[error("insufficient stock: requested {requested} kg but only {available} kg available")]
    InsufficientStock {
        /// Kilograms the order asked for.
        requested: i64,
        /// Kilograms on offer when the order was checked.
        available: i64,
    },

    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(Resource),

    /// Concurrent writers kept winning until the retry policy ran out.
    #[error("the record was modified concurrently, retry the request")]
    ConflictRetry,

    /// The text is not one of the order statuses.
    #[error("unrecognized order status '{0}'")]
    InvalidStatus(String),

    /// Storage failed; details are in the log only.
    #[error("storage {0} operation failed")]
    StorageFailure(Operation),

    /// The caller is not authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(AuthFailure),

    /// The caller is authenticated but may not do this.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// The request collides with existing data.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The verification code could not be sent.
    #[error("verification code could not be delivered")]
    DeliveryFailed,
}

/// Convenience alias for service results.
pub type MarketResult<T> = Result<T, MarketError>;

impl From<StoreError> for MarketError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(resource) => Self::NotFound(resource),
            StoreError::InsufficientStock {
                requested,
                available,
            } => Self::InsufficientStock {
                requested,
                available,
            },
            StoreError::VersionConflict => Self::ConflictRetry,
            StoreError::Duplicate(what) => Self::Conflict(format!("{what} is already registered")),
            StoreError::StillReferenced(resource) => {
                Self::Conflict(format!("{resource} is still referenced by orders"))
            }
            StoreError::Corrupt { .. } => Self::StorageFailure(Operation::DecodeRow),
            StoreError::StoreFailure { operation } => Self::StorageFailure(operation),
        }
    }
}

macro_rules! invalid_input_from {
    ($($error:ty => $field:literal),+ $(,)?) => {
        $(
            impl From<$error> for MarketError {
                fn from(error: $error) -> Self {
                    Self::InvalidInput(format!("{}: {}", $field, error))
                }
            }
        )+
    };
}

invalid_input_from! {
    UserIdError => "user id",
    ProductIdError => "product id",
    OrderIdError => "order id",
    EmailError => "email",
    AadharNumberError => "aadhar number",
    PhoneNumberError => "phone number",
    PinCodeError => "pin code",
    PersonNameError => "name",
    AddressLineError => "address",
    CityNameError => "city",
    StateNameError => "state",
    ProductNameError => "product name",
    ProductKindError => "product type",
    JariSizeError => "jari size",
    ImageUrlError => "image",
    DeliveryModeError => "mode of delivery",
    AdminUsernameError => "username",
    FarmSizeError => "farm size",
    QuantityKgError => "quantity",
    StockKgError => "stock",
    MoneyError => "amount",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_surfaces_as_conflict_retry() {
        let error: MarketError = StoreError::VersionConflict.into();
        assert_eq!(error, MarketError::ConflictRetry);
    }

    #[test]
    fn store_failure_keeps_the_operation() {
        let error: MarketError = StoreError::StoreFailure {
            operation: Operation::PlaceOrder,
        }
        .into();
        assert_eq!(error, MarketError::StorageFailure(Operation::PlaceOrder));
        assert_eq!(error.to_string(), "storage place_order operation failed");
    }

    #[test]
    fn validation_errors_name_the_field() {
        let error: MarketError = crate::types::QuantityKg::try_new(0)
            .expect_err("zero kilograms should be rejected")
            .into();
        match error {
            MarketError::InvalidInput(detail) => assert!(detail.starts_with("quantity: ")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn resources_render_with_their_identifier() {
        let id = ProductId::try_new(7).expect("valid product id");
        assert_eq!(StoreError::NotFound(Resource::Product(id)).to_string(), "product 7 not found");
    }
}
