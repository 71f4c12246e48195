//! Users, their roles, and the principal resolved at authentication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{MarketError, MarketResult};
use crate::types::{
    AadharNumber, AddressLine, AdminId, AdminUsername, CityName, Email, FarmSize, ImageUrl,
    PersonName, PhoneNumber, PinCode, StateName, UserId,
};

/// Postal location of a farm or a buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Street address or village.
    pub address: AddressLine,
    /// City or district town.
    pub city: CityName,
    /// Indian state.
    pub state: StateName,
    /// Six digit postal code.
    pub pin_code: PinCode,
}

/// What only farmers have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmerProfile {
    /// Farm area in acres.
    pub farm_size: FarmSize,
    /// Where the farm is.
    #[serde(flatten)]
    pub location: Location,
    /// Set by an admin; new farmers always start unapproved.
    #[serde(default)]
    pub approved: bool,
}

/// What only buyers have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerProfile {
    /// Default delivery location.
    #[serde(flatten)]
    pub location: Location,
}

/// Marketplace role with the attributes only that role has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "user_type", rename_all = "lowercase")]
pub enum Role {
    /// Sells produce.
    Farmer(FarmerProfile),
    /// Orders produce.
    Buyer(BuyerProfile),
}

impl Role {
    /// The role without its attributes.
    pub const fn kind(&self) -> RoleKind {
        match self {
            Self::Farmer(_) => RoleKind::Farmer,
            Self::Buyer(_) => RoleKind::Buyer,
        }
    }
}

/// Role discriminant, as stored in the `users.user_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    /// `"farmer"`.
    Farmer,
    /// `"buyer"`.
    Buyer,
}

impl RoleKind {
    /// Column value for this role.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Farmer => "farmer",
            Self::Buyer => "buyer",
        }
    }
}

impl std::str::FromStr for RoleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "farmer" => Ok(Self::Farmer),
            "buyer" => Ok(Self::Buyer),
            other => Err(format!("unknown user type '{other}'")),
        }
    }
}

/// A registered farmer or buyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Assigned by the store.
    pub id: UserId,
    /// Given name.
    pub first_name: PersonName,
    /// Family name.
    pub last_name: PersonName,
    /// Unique; verification codes are sent here.
    pub email: Email,
    /// Contact number in `+91...` form.
    pub phone_number: PhoneNumber,
    /// Unique national identity number.
    pub aadhar_number: AadharNumber,
    /// Profile picture URL.
    pub image: Option<ImageUrl>,
    /// Farmer or buyer, with the role's attributes.
    pub role: Role,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Last profile change.
    pub updated_at: DateTime<Utc>,
    /// Most recent completed login, if any.
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// The principal a session for this user carries.
    pub fn principal(&self) -> Principal {
        match self.role {
            Role::Farmer(_) => Principal::Farmer { user_id: self.id },
            Role::Buyer(_) => Principal::Buyer { user_id: self.id },
        }
    }
}

/// Everything needed to create a user. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Given name.
    pub first_name: PersonName,
    /// Family name.
    pub last_name: PersonName,
    /// Must match the address the signup code was sent to.
    pub email: Email,
    /// Contact number.
    pub phone_number: PhoneNumber,
    /// Twelve digit Aadhar number.
    pub aadhar_number: AadharNumber,
    /// Optional profile picture URL.
    #[serde(default)]
    pub image: Option<ImageUrl>,
    /// Role and its attributes; farmer approval is always reset.
    pub role: Role,
}

/// Administrator credentials as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAccount {
    /// Assigned by the store.
    pub id: AdminId,
    /// Unique login name.
    pub username: AdminUsername,
    /// Hex keyed digest from [`PasswordDigester`](crate::auth::PasswordDigester).
    pub password_digest: String,
}

/// Who is making a request, resolved once when the session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Principal {
    /// A signed-in farmer.
    Farmer {
        /// The farmer's account.
        user_id: UserId,
    },
    /// A signed-in buyer.
    Buyer {
        /// The buyer's account.
        user_id: UserId,
    },
    /// A signed-in administrator.
    Admin {
        /// The admin account.
        admin_id: AdminId,
    },
}

impl Principal {
    /// The user behind a farmer or buyer session; `None` for admins.
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Farmer { user_id } | Self::Buyer { user_id } => Some(*user_id),
            Self::Admin { .. } => None,
        }
    }

    /// True for admin sessions.
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin { .. })
    }

    /// True for admins and for the user `id` itself.
    pub fn may_access_user(&self, id: UserId) -> bool {
        self.is_admin() || self.user_id() == Some(id)
    }

    /// `Forbidden` unless this is an admin.
    pub const fn require_admin(&self) -> MarketResult<()> {
        match self {
            Self::Admin { .. } => Ok(()),
            _ => Err(MarketError::Forbidden("admin access required")),
        }
    }

    /// The farmer's id, or `Forbidden`.
    pub const fn require_farmer(&self) -> MarketResult<UserId> {
        match self {
            Self::Farmer { user_id } => Ok(*user_id),
            _ => Err(MarketError::Forbidden("only farmers may do this")),
        }
    }

    /// The buyer's id, or `Forbidden`.
    pub const fn require_buyer(&self) -> MarketResult<UserId> {
        match self {
            Self::Buyer { user_id } => Ok(*user_id),
            _ => Err(MarketError::Forbidden("only buyers may do this")),
        }
    }
}
