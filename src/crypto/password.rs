use argon2::{
    Argon2, ParamsBuilder,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use rand::{RngCore, rngs::OsRng};
use zeroize::Zeroize;

use crate::error::{AppError, Result};

/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 1;

/// Adaptive password hashing (Argon2id). Costs come from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    memory_kib: u32,
    iterations: u32,
}

impl PasswordHasher {
    pub fn new(memory_kib: u32, iterations: u32) -> Self {
        Self {
            memory_kib,
            iterations,
        }
    }

    /// Hashes a password using Argon2id.
    ///
    /// # Arguments
    ///
    /// * `password` - The password to hash.
    ///
    /// # Returns
    ///
    /// A `Result` containing the PHC-encoded hash.
    pub fn hash(&self, password: &str) -> Result<String> {
        let mut password_bytes = password.as_bytes().to_vec();

        let mut salt_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut salt_bytes);

        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AppError::Internal(format!("Salt encoding error: {}", e)))?;

        let argon2 = Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            ParamsBuilder::new()
                .m_cost(self.memory_kib)
                .t_cost(self.iterations)
                .p_cost(ARGON2_PARALLELISM)
                .build()
                .map_err(|e| AppError::Internal(format!("Argon2 params: {}", e)))?,
        );

        let password_hash = argon2
            .hash_password(&password_bytes, &salt)
            .map_err(|e| AppError::Internal(format!("Argon2 hash error: {}", e)))?
            .to_string();

        password_bytes.zeroize();
        tracing::debug!("Password hashed successfully with Argon2");
        Ok(password_hash)
    }

    /// Verifies a password against a hash. Costs are read from the hash itself.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let mut password_bytes = password.as_bytes().to_vec();
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Hash parse error: {}", e)))?;
        let result = Argon2::default()
            .verify_password(&password_bytes, &parsed_hash)
            .is_ok();

        password_bytes.zeroize();
        Ok(result)
    }

    /// Runs [`hash`](Self::hash) off the async executor.
    pub async fn hash_blocking(&self, password: String) -> Result<String> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || {
            let mut password = password;
            let hashed = hasher.hash(&password);
            password.zeroize();
            hashed
        })
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
    }

    /// Runs [`verify`](Self::verify) off the async executor.
    pub async fn verify_blocking(&self, password: String, hash: String) -> Result<bool> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || {
            let mut password = password;
            let verified = hasher.verify(&password, &hash);
            password.zeroize();
            verified
        })
        .await
        .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordHasher {
        PasswordHasher::new(64, 1)
    }

    #[test]
    fn hash_verifies_and_hides_plaintext() {
        let hasher = cheap();
        let hash = hasher.hash("Abcd1!ef").unwrap();
        assert!(!hash.contains("Abcd1!ef"));
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("Abcd1!ef", &hash).unwrap());
        assert!(!hasher.verify("Abcd1!eg", &hash).unwrap());
    }

    #[test]
    fn same_password_gets_fresh_salt() {
        let hasher = cheap();
        assert_ne!(hasher.hash("Abcd1!ef").unwrap(), hasher.hash("Abcd1!ef").unwrap());
    }
}
