use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies, Key};

use crate::{
    error::{AppError, Result},
    models::{session::Session, user::User},
    repositories::user::UserStore,
};

/// Name of the signed session cookie.
pub const SESSION_COOKIE: &str = "memories_session";

/// Issues, reads and destroys signed cookie sessions.
#[derive(Clone)]
pub struct SessionAuthority {
    key: Key,
    max_age_days: i64,
    allow_incomplete: bool,
}

impl SessionAuthority {
    pub fn new(key: Key, max_age_days: i64, allow_incomplete: bool) -> Self {
        Self {
            key,
            max_age_days,
            allow_incomplete,
        }
    }

    /// Creates a secure cookie carrying the serialized session.
    fn create_secure_cookie(&self, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::new(SESSION_COOKIE, value);

        let is_production = std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            == "production";

        cookie.set_http_only(true);
        if is_production {
            cookie.set_secure(true);
        }
        cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
        cookie.set_max_age(Duration::days(self.max_age_days));
        cookie.set_path("/");

        cookie
    }

    /// The session in the request, if its signature verifies.
    pub fn read(&self, cookies: &Cookies) -> Option<Session> {
        let cookie = cookies.signed(&self.key).get(SESSION_COOKIE)?;
        match sonic_rs::from_str::<Session>(cookie.value()) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Invalid session payload: {}", e);
                None
            }
        }
    }

    fn write(&self, cookies: &Cookies, session: &Session) -> Result<()> {
        let value = sonic_rs::to_string(session)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))?;
        cookies.signed(&self.key).add(self.create_secure_cookie(value));
        Ok(())
    }

    /// True iff the request carries a signed session with `authenticated` set.
    pub fn authenticate(&self, cookies: &Cookies) -> bool {
        self.read(cookies).is_some_and(|s| s.authenticated)
    }

    /// Verifies credentials and, on success, sets the session cookie.
    pub async fn login(
        &self,
        cookies: &Cookies,
        users: &UserStore,
        email: &str,
        password: &str,
    ) -> Result<User> {
        let user = users
            .verify_login(email, password, self.allow_incomplete)
            .await?;

        self.write(
            cookies,
            &Session {
                authenticated: true,
                email: user.email.clone(),
            },
        )?;

        tracing::info!(username = %user.username, "User logged in");
        Ok(user)
    }

    /// Clears the session and expires the cookie.
    pub fn logout(&self, cookies: &Cookies) {
        let mut cookie = Cookie::new(SESSION_COOKIE, "");
        cookie.set_path("/");
        cookie.set_max_age(Duration::seconds(-1));
        cookies.signed(&self.key).remove(cookie);
        tracing::debug!("Session cookie removed");
    }

    /// The user named by the session's email, provided they may still sign in.
    pub fn session_user(&self, cookies: &Cookies, users: &UserStore) -> Result<User> {
        let session = self
            .read(cookies)
            .filter(|s| s.authenticated && !s.email.is_empty())
            .ok_or(AppError::NoSession)?;
        let user = users.by_email(&session.email)?;
        if !user.may_sign_in(self.allow_incomplete) {
            tracing::warn!(username = %user.username, state = ?user.state, "Session refused");
            return Err(AppError::Forbidden);
        }
        Ok(user)
    }
}
