use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::file::{FileView, MediaClass, MemoryDate};

/// Default page size for search and favourites.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// A parsed search over published files. Empty fields do not filter.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Case-insensitive substring of the description.
    pub description: String,
    /// All must be present.
    pub tags: BTreeSet<String>,
    /// All must be present.
    pub people: BTreeSet<String>,
    pub min_date: MemoryDate,
    pub max_date: MemoryDate,
    pub classes: BTreeSet<MediaClass>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            description: String::new(),
            tags: BTreeSet::new(),
            people: BTreeSet::new(),
            min_date: MemoryDate::default(),
            max_date: MemoryDate::default(),
            classes: BTreeSet::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of matching files.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub files: Vec<FileView>,
    /// Number of matches across all pages.
    pub total: usize,
    pub page: usize,
    pub results_per_page: usize,
}

/// Which aggregate dimensions to compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateSelector {
    pub tags: bool,
    pub people: bool,
    pub file_types: bool,
    pub dates: bool,
}

impl AggregateSelector {
    /// Parses `tags,people,file_types,dates`; unknown names are ignored.
    pub fn parse(raw: &str) -> Self {
        let mut selector = Self::default();
        for part in raw.split(',').map(|p| p.trim().to_lowercase()) {
            match part.as_str() {
                "tags" => selector.tags = true,
                "people" => selector.people = true,
                "file_types" => selector.file_types = true,
                "dates" => selector.dates = true,
                _ => {}
            }
        }
        selector
    }
}

/// Sorted distinct values per requested dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub people: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dates: Option<Vec<String>>,
}
