//! Catalog codec: one self-describing binary file per store.
//!
//! Layout: 8-byte magic naming the catalog, a little-endian `u16` format
//! version, then the catalog encoded with bincode's standard config.
//! Catalogs hold only ordered collections, so encoding is deterministic.

use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{AppError, Result};

/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 1;

pub const FILE_DB_MAGIC: [u8; 8] = *b"MEMFILES";
pub const USER_DB_MAGIC: [u8; 8] = *b"MEMUSERS";
pub const SESSION_KEY_MAGIC: [u8; 8] = *b"MEMSKEY\0";

const HEADER_LEN: usize = 10;

/// Encodes `value` behind the catalog header.
pub fn encode<T: Serialize>(magic: [u8; 8], value: &T) -> Result<Vec<u8>> {
    let body = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| AppError::Serialization(format!("Bincode encode failed: {}", e)))?;

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&magic);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decodes a blob produced by [`encode`] with the same magic.
pub fn decode<T: DeserializeOwned>(magic: [u8; 8], bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN || bytes[..8] != magic {
        return Err(AppError::Serialization("Catalog header mismatch".to_string()));
    }

    let version = u16::from_le_bytes([bytes[8], bytes[9]]);
    if version != FORMAT_VERSION {
        return Err(AppError::Serialization(format!(
            "Unsupported catalog format version {}",
            version
        )));
    }

    let body = &bytes[HEADER_LEN..];
    let (value, read): (T, usize) =
        bincode::serde::decode_from_slice(body, bincode::config::standard())
            .map_err(|e| AppError::Serialization(format!("Bincode decode failed: {}", e)))?;

    if read != body.len() {
        return Err(AppError::Serialization(format!(
            "Trailing bytes after catalog: {}",
            body.len() - read
        )));
    }

    Ok(value)
}

/// Writes `value` to `path` through a sibling temporary file and a rename.
pub async fn write<T: Serialize>(path: &Path, magic: [u8; 8], value: &T) -> Result<()> {
    let bytes = encode(magic, value)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("dat.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;

    tracing::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Loads the catalog at `path`. An absent file is initialised with
/// `T::default()`; an unreadable one is an error, never an empty store.
pub async fn load_or_init<T>(path: &Path, magic: [u8; 8]) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let value = decode(magic, &bytes)?;
            tracing::info!("Loaded catalog {}", path.display());
            Ok(value)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let value = T::default();
            write(path, magic, &value).await?;
            tracing::info!("Initialised empty catalog {}", path.display());
            Ok(value)
        }
        Err(e) => Err(AppError::Io(e)),
    }
}
