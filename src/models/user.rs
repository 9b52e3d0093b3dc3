use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// What a user is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Standard,
    Admin,
    SuperAdmin,
    Guest,
}

impl AccountType {
    pub fn is_admin(&self) -> bool {
        matches!(self, AccountType::Admin | AccountType::SuperAdmin)
    }
}

/// Registration progress. Admin and email confirmation are independent;
/// a user holding both is Complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    Unregistered,
    AdminConfirmed,
    EmailConfirmed,
    Complete,
    Blocked,
}

impl RegistrationState {
    pub fn confirm_by_admin(self) -> Self {
        match self {
            RegistrationState::Unregistered => RegistrationState::AdminConfirmed,
            RegistrationState::EmailConfirmed => RegistrationState::Complete,
            other => other,
        }
    }

    pub fn confirm_email(self) -> Self {
        match self {
            RegistrationState::Unregistered => RegistrationState::EmailConfirmed,
            RegistrationState::AdminConfirmed => RegistrationState::Complete,
            other => other,
        }
    }
}

/// A temporary password issued by a reset request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetPassword {
    pub hash: String,
    /// Nanoseconds since the unix epoch.
    pub expires_at: i64,
}

/// Represents a user in the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique; forename + surname plus a numeric disambiguator.
    pub username: String,
    /// Unique, stored lowercase.
    pub email: String,
    /// Adaptive hash of the password; never the plaintext.
    pub password_hash: String,
    pub reset_password: Option<ResetPassword>,
    pub forename: String,
    pub surname: String,
    pub account_type: AccountType,
    /// Nanoseconds since the unix epoch.
    pub created_at: i64,
    pub profile_image: String,
    /// File identifiers; dangling ones are skipped on read.
    pub favourites: BTreeSet<String>,
    pub state: RegistrationState,
}

impl User {
    /// Blocked users never hold a session; half-registered ones only when
    /// `allow_incomplete` is set.
    pub fn may_sign_in(&self, allow_incomplete: bool) -> bool {
        match self.state {
            RegistrationState::Complete => true,
            RegistrationState::Blocked => false,
            _ => allow_incomplete,
        }
    }
}

/// Public view of a user; carries no credentials.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub username: String,
    pub forename: String,
    pub surname: String,
    pub account_type: AccountType,
    pub state: RegistrationState,
    pub created_at: i64,
    pub profile_image: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            forename: user.forename.clone(),
            surname: user.surname.clone(),
            account_type: user.account_type,
            state: user.state,
            created_at: user.created_at,
            profile_image: user.profile_image.clone(),
        }
    }
}
