use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// On-disk directory convention under the data root.
///
/// ```text
/// <root>/config/settings.ini
/// <root>/config/session_key.dat
/// <root>/db/file_db.dat
/// <root>/db/user_db.dat
/// <root>/db/temp/<username>/<file-id>.<ext>
/// <root>/db/deleted/<file-id>.<ext>
/// <root>/static/content/<file-id>.<ext>
/// ```
#[derive(Debug, Clone)]
pub struct BlobLayout {
    root: PathBuf,
}

impl BlobLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir().join("settings.ini")
    }

    pub fn session_key_path(&self) -> PathBuf {
        self.config_dir().join("session_key.dat")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    pub fn file_db_path(&self) -> PathBuf {
        self.db_dir().join("file_db.dat")
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir().join("user_db.dat")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.db_dir().join("temp")
    }

    pub fn deleted_dir(&self) -> PathBuf {
        self.db_dir().join("deleted")
    }

    pub fn static_dir(&self) -> PathBuf {
        self.root.join("static")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.static_dir().join("content")
    }

    /// Staging area of one user.
    pub fn user_temp_dir(&self, username: &str) -> Result<PathBuf> {
        Ok(self.temp_dir().join(safe_segment(username)?))
    }

    pub fn staged_blob(&self, username: &str, blob_name: &str) -> Result<PathBuf> {
        Ok(self.user_temp_dir(username)?.join(safe_segment(blob_name)?))
    }

    pub fn published_blob(&self, blob_name: &str) -> Result<PathBuf> {
        Ok(self.content_dir().join(safe_segment(blob_name)?))
    }

    pub fn deleted_blob(&self, blob_name: &str) -> Result<PathBuf> {
        Ok(self.deleted_dir().join(safe_segment(blob_name)?))
    }

    /// Creates every fixed directory of the layout.
    pub async fn ensure(&self) -> Result<()> {
        for dir in [
            self.config_dir(),
            self.db_dir(),
            self.temp_dir(),
            self.deleted_dir(),
            self.content_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        tracing::debug!("Layout ready under {}", self.root.display());
        Ok(())
    }
}

/// Rejects anything that could escape its parent directory.
fn safe_segment(segment: &str) -> Result<&str> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
        || segment.contains('\0')
    {
        return Err(AppError::InvalidRequest(format!(
            "Invalid path segment: {:?}",
            segment
        )));
    }
    Ok(segment)
}
