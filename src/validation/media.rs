use std::path::Path;

use crate::{
    config::FormatLists,
    error::{AppError, Result},
    models::file::MediaClass,
};

/// Name, extension and class of an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadKind {
    pub name: String,
    pub extension: String,
    pub class: MediaClass,
}

/// Validates an uploaded file name and size against the configured limits.
pub fn classify_upload(
    filename: &str,
    size: u64,
    max_size: u64,
    formats: &FormatLists,
) -> Result<UploadKind> {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("Missing file name".to_string()))?;

    let (name, extension) = base
        .rsplit_once('.')
        .ok_or_else(|| AppError::UnsupportedFormat(String::new()))?;
    let extension = extension.to_lowercase();

    if extension.is_empty() || extension.contains(',') {
        return Err(AppError::UnsupportedFormat(extension));
    }

    let class = formats
        .classify(&extension)
        .ok_or_else(|| AppError::UnsupportedFormat(extension.clone()))?;

    if size > max_size {
        return Err(AppError::TooLarge {
            size,
            max: max_size,
        });
    }
    if size == 0 {
        return Err(AppError::InvalidRequest("Empty upload".to_string()));
    }

    Ok(UploadKind {
        name: name.to_string(),
        extension,
        class,
    })
}
