use std::path::Path;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tower_cookies::Key;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    error::{AppError, Result},
    repositories::codec,
};

/// Length of the cookie signing key in bytes.
pub const SESSION_KEY_LEN: usize = 64;

/// The persisted signing key, stored through the catalog codec.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredKey {
    bytes: Vec<u8>,
}

/// Loads the session key at `path`, generating and persisting a fresh one
/// on first start. Any failure here is fatal for the caller.
pub async fn load_or_create(path: &Path) -> Result<Key> {
    let stored = match tokio::fs::read(path).await {
        Ok(bytes) => {
            let stored: StoredKey = codec::decode(codec::SESSION_KEY_MAGIC, &bytes)?;
            tracing::info!("Loaded session key from {}", path.display());
            stored
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let mut bytes = vec![0u8; SESSION_KEY_LEN];
            OsRng
                .try_fill_bytes(&mut bytes)
                .map_err(|e| AppError::Internal(format!("Failed to generate session key: {}", e)))?;
            let stored = StoredKey { bytes };
            codec::write(path, codec::SESSION_KEY_MAGIC, &stored).await?;
            tracing::info!("Generated new session key at {}", path.display());
            stored
        }
        Err(e) => return Err(AppError::Io(e)),
    };

    if stored.bytes.len() != SESSION_KEY_LEN {
        return Err(AppError::Serialization(format!(
            "Session key must be {} bytes, found {}",
            SESSION_KEY_LEN,
            stored.bytes.len()
        )));
    }

    Ok(Key::from(stored.bytes.as_slice()))
}
