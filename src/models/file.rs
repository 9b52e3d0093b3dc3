use std::collections::BTreeSet;

use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Opaque 128-bit identifier rendered as 32 lowercase hex characters.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Current time as nanoseconds since the unix epoch.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Where a file is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishState {
    Uploaded,
    Published,
    Deleted,
}

/// Media class derived from the extension against the configured whitelists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MediaClass {
    Image,
    Video,
    Audio,
    Text,
    Other,
}

impl MediaClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaClass::Image => "image",
            MediaClass::Video => "video",
            MediaClass::Audio => "audio",
            MediaClass::Text => "text",
            MediaClass::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "image" => Some(MediaClass::Image),
            "video" => Some(MediaClass::Video),
            "audio" => Some(MediaClass::Audio),
            "text" => Some(MediaClass::Text),
            "other" => Some(MediaClass::Other),
            _ => None,
        }
    }
}

/// A day-precision date stored as the unix timestamp of UTC midnight.
///
/// The default is the unset sentinel, which no parsed date can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemoryDate(pub i64);

impl Default for MemoryDate {
    fn default() -> Self {
        Self::UNSET
    }
}

impl MemoryDate {
    pub const UNSET: MemoryDate = MemoryDate(i64::MIN);

    /// Parses `YYYY-MM-DD`.
    pub fn parse(raw: &str) -> Option<Self> {
        let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()?;
        Some(Self::from_naive(date))
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        MemoryDate(Utc.from_utc_datetime(&midnight).timestamp())
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }

    /// `YYYY-MM-DD`, or empty when unset.
    pub fn format(&self) -> String {
        if self.is_unset() {
            return String::new();
        }
        Utc.timestamp_opt(self.0, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }
}

/// Trims, lowercases and dedups a token list; empty tokens are dropped.
pub fn normalise_tokens<I, S>(raw: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Splits a comma-separated token list and normalises it.
pub fn split_tokens(raw: &str) -> BTreeSet<String> {
    normalise_tokens(raw.split(','))
}

/// Descriptive metadata attached at publish time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub description: String,
    pub tags: BTreeSet<String>,
    pub people: BTreeSet<String>,
    pub date: MemoryDate,
}

/// A change to an existing file's metadata; `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct MetadataDelta {
    pub description: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub people: Option<BTreeSet<String>>,
    pub date: Option<MemoryDate>,
}

/// Represents a media file in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// The unique identifier for the file.
    pub id: String,
    /// Base name as uploaded, without extension.
    pub name: String,
    /// Lowercase extension, derived once at staging.
    pub extension: String,
    /// Nanoseconds since the unix epoch.
    pub added_at: i64,
    /// Username of the uploader.
    pub uploader: String,
    pub state: PublishState,
    pub class: MediaClass,
    /// Hex-encoded SHA-256 of the payload.
    pub hash: String,
    pub size: u64,
    pub metadata: Metadata,
}

impl File {
    /// Name of the blob on disk.
    pub fn blob_name(&self) -> String {
        format!("{}.{}", self.id, self.extension)
    }

    pub fn is_published(&self) -> bool {
        self.state == PublishState::Published
    }
}

/// The kind of catalog change a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Create,
    Edit,
    Delete,
}

/// Immutable record of one catalog-changing event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub file_id: String,
    pub kind: TransactionKind,
    pub created_at: i64,
    /// Service version at the time of writing.
    pub version: String,
}

impl Transaction {
    pub fn new(file_id: &str, kind: TransactionKind, version: &str) -> Self {
        Self {
            id: new_id(),
            file_id: file_id.to_string(),
            kind,
            created_at: now_nanos(),
            version: version.to_string(),
        }
    }
}

/// Public view of a file as returned by search and listings.
#[derive(Debug, Clone, Serialize)]
pub struct FileView {
    pub id: String,
    pub name: String,
    pub extension: String,
    pub added_at: i64,
    pub uploader: String,
    pub class: &'static str,
    pub hash: String,
    pub size: u64,
    pub description: String,
    pub tags: Vec<String>,
    pub people: Vec<String>,
    pub date: String,
    pub url: String,
}

impl From<&File> for FileView {
    fn from(file: &File) -> Self {
        let url = match file.state {
            PublishState::Uploaded => format!("/temp_uploaded/{}/{}", file.uploader, file.blob_name()),
            _ => format!("/static/content/{}", file.blob_name()),
        };
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            extension: file.extension.clone(),
            added_at: file.added_at,
            uploader: file.uploader.clone(),
            class: file.class.as_str(),
            hash: file.hash.clone(),
            size: file.size,
            description: file.metadata.description.clone(),
            tags: file.metadata.tags.iter().cloned().collect(),
            people: file.metadata.people.iter().cloned().collect(),
            date: file.metadata.date.format(),
            url,
        }
    }
}
