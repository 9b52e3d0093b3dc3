//! The User Store: a mutex-guarded user map keyed by username.
//!
//! Simple reads and writes take the lock internally; compound operations
//! go through [`UserStore::perform`], which holds the lock for the whole
//! inspector.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    crypto::{password::PasswordHasher, token},
    error::{AppError, Result},
    models::{
        file::now_nanos,
        user::{AccountType, RegistrationState, ResetPassword, User},
    },
    repositories::{codec, layout::BlobLayout},
    validation::user::{validate_password, validate_registration},
};

/// Lifetime of a temporary reset password (one hour).
const RESET_TTL_NANOS: i64 = 3600 * 1_000_000_000;

/// The serialized form of the user map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCatalog {
    users: BTreeMap<String, User>,
}

/// Input for [`UserStore::add_user`].
#[derive(Debug)]
pub struct NewUser {
    pub forename: String,
    pub surname: String,
    pub email: String,
    pub password: Zeroizing<String>,
    pub account_type: AccountType,
    pub state: RegistrationState,
}

#[derive(Clone)]
pub struct UserStore {
    users: Arc<Mutex<BTreeMap<String, User>>>,
    path: PathBuf,
    hasher: PasswordHasher,
    /// Serializes catalog writes; they share one temporary file.
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl UserStore {
    /// Loads `db/user_db.dat`, initialising it when absent.
    pub async fn open(layout: &BlobLayout, hasher: PasswordHasher) -> Result<Self> {
        let path = layout.user_db_path();
        let catalog: UserCatalog = codec::load_or_init(&path, codec::USER_DB_MAGIC).await?;
        tracing::info!(users = catalog.users.len(), "User store loaded");

        Ok(Self {
            users: Arc::new(Mutex::new(catalog.users)),
            path,
            hasher,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Runs `f` with the user map locked for its whole duration.
    pub fn perform<R>(&self, f: impl FnOnce(&mut BTreeMap<String, User>) -> R) -> Result<R> {
        let mut users = self
            .users
            .lock()
            .map_err(|_| AppError::Internal("User store lock poisoned".to_string()))?;
        Ok(f(&mut users))
    }

    pub fn get(&self, username: &str) -> Result<User> {
        self.perform(|users| users.get(username).cloned())?
            .ok_or(AppError::UserNotFound)
    }

    /// Linear scan; emails are stored lowercase.
    pub fn by_email(&self, email: &str) -> Result<User> {
        let email = email.trim().to_lowercase();
        self.perform(|users| users.values().find(|u| u.email == email).cloned())?
            .ok_or(AppError::UserNotFound)
    }

    pub fn set(&self, user: User) -> Result<()> {
        self.perform(|users| {
            users.insert(user.username.clone(), user);
        })
    }

    pub fn count(&self) -> Result<usize> {
        self.perform(|users| users.len())
    }

    pub fn delete(&self, username: &str) -> Result<User> {
        self.perform(|users| users.remove(username))?
            .ok_or(AppError::UserNotFound)
    }

    /// All users ordered by username.
    pub fn list(&self) -> Result<Vec<User>> {
        self.perform(|users| users.values().cloned().collect())
    }

    /// Validates, hashes and inserts a new user under a unique username.
    pub async fn add_user(&self, new_user: NewUser) -> Result<User> {
        let NewUser {
            forename,
            surname,
            email,
            password,
            account_type,
            state,
        } = new_user;

        let forename = forename.trim().to_string();
        let surname = surname.trim().to_string();
        let email = email.trim().to_lowercase();

        validate_registration(&forename, &surname, &email)?;
        validate_password(&password)?;

        if self.by_email(&email).is_ok() {
            return Err(AppError::DuplicateEmail);
        }

        let password_hash = self.hasher.hash_blocking(password.to_string()).await?;
        drop(password);

        let base = username_base(&forename, &surname);
        let user = self.perform(|users| -> Result<User> {
            if users.values().any(|u| u.email == email) {
                return Err(AppError::DuplicateEmail);
            }

            let username = unique_username(users, &base);
            let user = User {
                username: username.clone(),
                email: email.clone(),
                password_hash,
                reset_password: None,
                forename: forename.clone(),
                surname: surname.clone(),
                account_type,
                created_at: now_nanos(),
                profile_image: String::new(),
                favourites: BTreeSet::new(),
                state,
            };
            users.insert(username, user.clone());
            Ok(user)
        })??;

        tracing::info!(username = %user.username, "User added");
        Ok(user)
    }

    /// Checks credentials for `email`. Accepts an unexpired temporary reset
    /// password as well as the regular one.
    pub async fn verify_login(
        &self,
        email: &str,
        password: &str,
        allow_incomplete: bool,
    ) -> Result<User> {
        let user = self.by_email(email).map_err(|_| AppError::Unauthorised)?;

        let mut verified = self
            .hasher
            .verify_blocking(password.to_string(), user.password_hash.clone())
            .await?;

        if !verified {
            if let Some(reset) = user.reset_password.as_ref().filter(|r| r.expires_at > now_nanos()) {
                verified = self
                    .hasher
                    .verify_blocking(password.to_string(), reset.hash.clone())
                    .await?;
            }
        }

        if !verified {
            return Err(AppError::Unauthorised);
        }

        if !user.may_sign_in(allow_incomplete) {
            return Err(AppError::Forbidden);
        }
        Ok(user)
    }

    /// Adds or removes a favourite on the named user.
    pub fn set_favourite(&self, username: &str, file_id: &str, add: bool) -> Result<User> {
        self.perform(|users| {
            let user = users.get_mut(username).ok_or(AppError::UserNotFound)?;
            if add {
                user.favourites.insert(file_id.to_string());
            } else {
                user.favourites.remove(file_id);
            }
            Ok(user.clone())
        })?
    }

    /// Moves a user through the registration state machine.
    pub fn transition(
        &self,
        username: &str,
        step: impl FnOnce(RegistrationState) -> RegistrationState,
    ) -> Result<User> {
        let user = self.perform(|users| -> Result<User> {
            let user = users.get_mut(username).ok_or(AppError::UserNotFound)?;
            user.state = step(user.state);
            Ok(user.clone())
        })??;
        tracing::info!(username = %username, state = ?user.state, "Registration state changed");
        Ok(user)
    }

    /// Issues a temporary password for `email`. The plaintext is returned
    /// once for the mailer; only its hash is stored.
    pub async fn issue_reset(&self, email: &str) -> Result<(User, Zeroizing<String>)> {
        let user = self.by_email(email)?;
        let temporary = Zeroizing::new(token::generate_temporary_password());
        let hash = self.hasher.hash_blocking(temporary.to_string()).await?;

        let user = self.perform(|users| -> Result<User> {
            let stored = users.get_mut(&user.username).ok_or(AppError::UserNotFound)?;
            stored.reset_password = Some(ResetPassword {
                hash,
                expires_at: now_nanos() + RESET_TTL_NANOS,
            });
            Ok(stored.clone())
        })??;

        tracing::info!(username = %user.username, "Temporary password issued");
        Ok((user, temporary))
    }

    /// Replaces the password after checking the temporary one.
    pub async fn confirm_reset(&self, email: &str, temporary: &str, new_password: &str) -> Result<User> {
        validate_password(new_password)?;
        let user = self.by_email(email)?;

        let reset = user
            .reset_password
            .clone()
            .filter(|r| r.expires_at > now_nanos())
            .ok_or(AppError::Unauthorised)?;
        if !self
            .hasher
            .verify_blocking(temporary.to_string(), reset.hash)
            .await?
        {
            return Err(AppError::Unauthorised);
        }

        let password_hash = self.hasher.hash_blocking(new_password.to_string()).await?;
        let user = self.perform(|users| -> Result<User> {
            let stored = users.get_mut(&user.username).ok_or(AppError::UserNotFound)?;
            stored.password_hash = password_hash;
            stored.reset_password = None;
            Ok(stored.clone())
        })??;

        tracing::info!(username = %user.username, "Password reset completed");
        Ok(user)
    }

    /// Writes `db/user_db.dat`, first pruning favourites that no longer
    /// name a file in `known_files`.
    pub async fn serialize(&self, known_files: &BTreeSet<String>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let catalog = self.perform(|users| {
            for user in users.values_mut() {
                user.favourites.retain(|id| known_files.contains(id));
            }
            UserCatalog {
                users: users.clone(),
            }
        })?;

        codec::write(&self.path, codec::USER_DB_MAGIC, &catalog).await
    }
}

/// Forename + surname with anything but ASCII letters and digits removed.
fn username_base(forename: &str, surname: &str) -> String {
    let base: String = forename
        .chars()
        .chain(surname.chars())
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if base.is_empty() { "user".to_string() } else { base }
}

/// `base`, or `base2`, `base3`, ... for the first name not yet taken.
fn unique_username(users: &BTreeMap<String, User>, base: &str) -> String {
    if !users.contains_key(base) {
        return base.to_string();
    }
    (2u64..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !users.contains_key(candidate))
        .unwrap_or_else(|| format!("{}{}", base, crate::models::file::new_id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open(dir: &TempDir) -> UserStore {
        let layout = BlobLayout::new(dir.path());
        layout.ensure().await.unwrap();
        UserStore::open(&layout, PasswordHasher::new(64, 1)).await.unwrap()
    }

    fn jem(email: &str, password: &str) -> NewUser {
        NewUser {
            forename: "Jem".to_string(),
            surname: "Gunay".to_string(),
            email: email.to_string(),
            password: Zeroizing::new(password.to_string()),
            account_type: AccountType::Standard,
            state: RegistrationState::Complete,
        }
    }

    #[tokio::test]
    async fn registration_validation_and_usernames() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;

        let bad_email = store.add_user(jem("bad-email", "Abcd1!ef")).await;
        assert!(matches!(bad_email, Err(AppError::InvalidField(f)) if f == "email"));

        let weak = store.add_user(jem("j@x.co", "abcdefgh")).await;
        assert!(matches!(weak, Err(AppError::WeakPassword)));

        let first = store.add_user(jem("j@x.co", "Abcd1!ef")).await.unwrap();
        assert_eq!(first.username, "JemGunay");

        let second = store.add_user(jem("j2@x.co", "Abcd1!ef")).await.unwrap();
        assert_eq!(second.username, "JemGunay2");

        let duplicate = store.add_user(jem("J@X.co", "Abcd1!ef")).await;
        assert!(matches!(duplicate, Err(AppError::DuplicateEmail)));
        assert_eq!(store.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn login_respects_password_and_registration_state() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;

        store.add_user(jem("j@x.co", "Abcd1!ef")).await.unwrap();
        let mut pending = jem("p@x.co", "Abcd1!ef");
        pending.state = RegistrationState::Unregistered;
        store.add_user(pending).await.unwrap();

        assert!(store.verify_login("j@x.co", "Abcd1!ef", false).await.is_ok());
        assert!(matches!(
            store.verify_login("j@x.co", "wrong", false).await,
            Err(AppError::Unauthorised)
        ));
        assert!(matches!(
            store.verify_login("nobody@x.co", "Abcd1!ef", false).await,
            Err(AppError::Unauthorised)
        ));
        assert!(matches!(
            store.verify_login("p@x.co", "Abcd1!ef", false).await,
            Err(AppError::Forbidden)
        ));
        assert!(store.verify_login("p@x.co", "Abcd1!ef", true).await.is_ok());
    }

    #[tokio::test]
    async fn reset_flow_replaces_password() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        store.add_user(jem("j@x.co", "Abcd1!ef")).await.unwrap();

        let (_, temporary) = store.issue_reset("j@x.co").await.unwrap();
        assert!(store.verify_login("j@x.co", &temporary, false).await.is_ok());

        store
            .confirm_reset("j@x.co", &temporary, "Newpass1!")
            .await
            .unwrap();
        assert!(store.verify_login("j@x.co", "Newpass1!", false).await.is_ok());
        assert!(store.verify_login("j@x.co", "Abcd1!ef", false).await.is_err());
        assert!(store.verify_login("j@x.co", &temporary, false).await.is_err());
    }

    #[tokio::test]
    async fn persisted_catalog_has_no_plaintext_and_prunes_favourites() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        let user = store.add_user(jem("j@x.co", "Abcd1!ef")).await.unwrap();
        store.set_favourite(&user.username, "kept", true).unwrap();
        store.set_favourite(&user.username, "gone", true).unwrap();

        let known: BTreeSet<String> = ["kept".to_string()].into_iter().collect();
        store.serialize(&known).await.unwrap();

        let bytes = std::fs::read(dir.path().join("db/user_db.dat")).unwrap();
        assert!(!bytes.windows(8).any(|w| w == b"Abcd1!ef"));

        let reopened = open(&dir).await;
        let loaded = reopened.get(&user.username).unwrap();
        assert_eq!(
            loaded.favourites.into_iter().collect::<Vec<_>>(),
            vec!["kept".to_string()]
        );
        assert_eq!(loaded.password_hash, store.get(&user.username).unwrap().password_hash);
    }

    #[tokio::test]
    async fn registration_transitions() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        let mut pending = jem("p@x.co", "Abcd1!ef");
        pending.state = RegistrationState::Unregistered;
        let user = store.add_user(pending).await.unwrap();

        let user = store
            .transition(&user.username, RegistrationState::confirm_by_admin)
            .unwrap();
        assert_eq!(user.state, RegistrationState::AdminConfirmed);
        let user = store
            .transition(&user.username, RegistrationState::confirm_email)
            .unwrap();
        assert_eq!(user.state, RegistrationState::Complete);
        assert_eq!(store.get(&user.username).unwrap().state, RegistrationState::Complete);
    }

    #[tokio::test]
    async fn updates_on_unknown_users_fail_cleanly() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;

        assert!(matches!(
            store.transition("ghost", |_| RegistrationState::Blocked),
            Err(AppError::UserNotFound)
        ));
        assert!(matches!(
            store.issue_reset("ghost@x.co").await,
            Err(AppError::UserNotFound)
        ));
        assert!(matches!(
            store.confirm_reset("ghost@x.co", "whatever", "Newpass1!").await,
            Err(AppError::UserNotFound)
        ));
        assert_eq!(store.count().unwrap(), 0);
    }
}
