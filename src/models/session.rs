use serde::{Deserialize, Serialize};

/// Values carried inside the signed session cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Set on successful login, cleared on logout.
    pub authenticated: bool,
    /// The email of the logged-in user.
    pub email: String,
}
