//! Signup, login, profiles and admin approval of farmers.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::auth::{CodeIssuer, PasswordDigester, SessionToken, Sessions};
use crate::errors::{AuthFailure, MarketError, MarketResult, Resource, StoreError};
use crate::store::MarketStore;
use crate::types::{AadharNumber, AdminUsername, Email, PhoneNumber, UserId};
use crate::user::{AdminAccount, Principal, Registration, Role, User};

/// A freshly authenticated caller.
#[derive(Debug, Clone, Serialize)]
pub struct SignedIn {
    /// Bearer token to send back on later requests.
    pub token: SessionToken,
    /// Who the token authenticates.
    pub principal: Principal,
}

/// First signup step: where to send the code, and the identity to reserve.
#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    /// Address the verification code goes to.
    pub email: String,
    /// Twelve digit Aadhar number, checked for duplicates.
    pub aadhar_number: String,
}

/// Second signup step.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteSignupRequest {
    /// The account to create.
    pub user: Registration,
    /// Code emailed by [`Accounts::start_signup`].
    pub verification_code: String,
}

/// First login step.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Registered email address.
    pub email: String,
}

/// Second login step.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteLoginRequest {
    /// Email the code was sent to.
    pub email: String,
    /// Code emailed by [`Accounts::start_login`].
    pub verification_code: String,
}

/// Admin credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminLoginRequest {
    /// Admin login name.
    pub username: String,
    /// Plain password, digested before comparison.
    pub password: String,
}

/// User and admin accounts, and the sessions they sign in with.
///
/// Farmers and buyers authenticate with a one-time code emailed to them;
/// admins with a username and password checked against a keyed digest.
#[derive(Clone)]
pub struct Accounts {
    store: Arc<dyn MarketStore>,
    codes: CodeIssuer,
    sessions: Sessions,
    digester: PasswordDigester,
}

impl Accounts {
    /// Builds the service over its store, code issuer and session table.
    pub fn new(
        store: Arc<dyn MarketStore>,
        codes: CodeIssuer,
        sessions: Sessions,
        digester: PasswordDigester,
    ) -> Self {
        Self {
            store,
            codes,
            sessions,
            digester,
        }
    }

    /// Sends a signup code after checking neither identifier is taken.
    #[instrument(name = "accounts.start_signup", skip_all)]
    pub async fn start_signup(&self, request: SignupRequest) -> MarketResult<()> {
        let email = Email::try_new(request.email)?;
        let aadhar = AadharNumber::try_new(request.aadhar_number)?;
        if self.store.identity_taken(&email, &aadhar).await? {
            return Err(MarketError::Conflict(
                "email or aadhar number is already registered".to_string(),
            ));
        }
        self.codes.issue(&email).await
    }

    /// Creates the user once the emailed code checks out.
    #[instrument(name = "accounts.complete_signup", skip_all)]
    pub async fn complete_signup(
        &self,
        request: CompleteSignupRequest,
    ) -> MarketResult<(User, SignedIn)> {
        let mut registration = request.user;
        self.codes
            .verify(&registration.email, &request.verification_code)
            .await?;

        if let Role::Farmer(profile) = &mut registration.role {
            profile.approved = false;
        }
        let user = self.store.create_user(registration).await?;
        info!(
            user = %user.id,
            user_type = user.role.kind().as_str(),
            "[accounts.complete_signup] user registered"
        );

        let signed_in = self.open_session(user.principal()).await?;
        Ok((user, signed_in))
    }

    /// Sends a login code to a registered email.
    #[instrument(name = "accounts.start_login", skip_all)]
    pub async fn start_login(&self, request: LoginRequest) -> MarketResult<()> {
        let email = Email::try_new(request.email)?;
        if self.store.user_by_email(&email).await?.is_none() {
            return Err(MarketError::NotFound(Resource::Account));
        }
        self.codes.issue(&email).await
    }

    /// Logs in the owner of the email the code was sent to.
    #[instrument(name = "accounts.complete_login", skip_all)]
    pub async fn complete_login(
        &self,
        request: CompleteLoginRequest,
    ) -> MarketResult<(User, SignedIn)> {
        let email = Email::try_new(request.email)?;
        self.codes.verify(&email, &request.verification_code).await?;

        let mut user = self
            .store
            .user_by_email(&email)
            .await?
            .ok_or(MarketError::NotFound(Resource::Account))?;
        let now = Utc::now();
        self.store.record_login(user.id, now).await?;
        user.last_login_at = Some(now);

        let signed_in = self.open_session(user.principal()).await?;
        info!(user = %user.id, "[accounts.complete_login] user logged in");
        Ok((user, signed_in))
    }

    /// Opens an admin session. Unknown usernames and wrong passwords fail
    /// the same way.
    #[instrument(name = "accounts.admin_login", skip_all)]
    pub async fn admin_login(&self, request: AdminLoginRequest) -> MarketResult<SignedIn> {
        let rejected = MarketError::Unauthorized(AuthFailure::InvalidCredentials);
        let Ok(username) = AdminUsername::try_new(request.username) else {
            return Err(rejected);
        };
        let Some(admin) = self.store.admin_by_username(&username).await? else {
            warn!("[accounts.admin_login] unknown admin username");
            return Err(rejected);
        };
        if !self
            .digester
            .verify(&admin.username, &request.password, &admin.password_digest)
        {
            warn!(admin = %admin.id, "[accounts.admin_login] wrong admin password");
            return Err(rejected);
        }
        self.open_session(Principal::Admin { admin_id: admin.id })
            .await
    }

    /// Creates the admin account or resets its password.
    pub async fn ensure_admin(
        &self,
        username: AdminUsername,
        password: &str,
    ) -> MarketResult<AdminAccount> {
        let digest = self.digester.digest(&username, password);
        let admin = self.store.upsert_admin(username, digest).await?;
        info!(admin = %admin.id, "[accounts.ensure_admin] admin account ready");
        Ok(admin)
    }

    /// Resolves a bearer token to its principal.
    pub async fn authenticate(&self, token: SessionToken) -> MarketResult<Principal> {
        self.sessions.resolve(token).await
    }

    /// Ends the session. Unknown tokens are ignored.
    pub async fn logout(&self, token: SessionToken) -> MarketResult<()> {
        self.sessions.close(token).await
    }

    /// A user's profile, visible to the user and to admins.
    pub async fn profile(&self, principal: &Principal, user_id: UserId) -> MarketResult<User> {
        if !principal.may_access_user(user_id) {
            return Err(MarketError::Forbidden("cannot view another user's profile"));
        }
        self.store
            .user(user_id)
            .await?
            .ok_or(MarketError::NotFound(Resource::User(user_id)))
    }

    /// Changes the caller's own phone number.
    #[instrument(name = "accounts.update_phone_number", skip(self, phone_number))]
    pub async fn update_phone_number(
        &self,
        principal: &Principal,
        user_id: UserId,
        phone_number: String,
    ) -> MarketResult<User> {
        if principal.user_id() != Some(user_id) {
            return Err(MarketError::Forbidden("cannot edit another user's profile"));
        }
        let phone_number = PhoneNumber::try_new(phone_number)?;
        Ok(self.store.update_phone_number(user_id, phone_number).await?)
    }

    /// Farmers waiting for approval. Admins only.
    pub async fn unapproved_farmers(&self, principal: &Principal) -> MarketResult<Vec<User>> {
        principal.require_admin()?;
        Ok(self.store.unapproved_farmers().await?)
    }

    /// Marks a farmer approved. Admins only.
    #[instrument(name = "accounts.approve_farmer", skip(self))]
    pub async fn approve_farmer(&self, principal: &Principal, user_id: UserId) -> MarketResult<()> {
        principal.require_admin()?;
        match self.store.approve_farmer(user_id).await {
            Ok(()) => {
                info!(farmer = %user_id, "[accounts.approve_farmer] farmer approved");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(MarketError::NotFound(Resource::Farmer(user_id))),
            Err(error) => Err(error.into()),
        }
    }

    async fn open_session(&self, principal: Principal) -> MarketResult<SignedIn> {
        let token = self.sessions.open(principal).await?;
        Ok(SignedIn { token, principal })
    }
}
