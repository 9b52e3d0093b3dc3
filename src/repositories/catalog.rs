//! In-memory file catalog: the index plus the transaction log.
//!
//! Every method is synchronous and free of I/O; the broker in
//! `repositories::file` sequences blob moves around these calls.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    models::{
        file::{File, FileView, Metadata, MetadataDelta, PublishState, Transaction, TransactionKind},
        query::{Aggregate, AggregateSelector, DEFAULT_PAGE_SIZE, SearchPage, SearchQuery},
        user::AccountType,
    },
};

/// Who is asking; carried by identifier only, the catalog never sees users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub username: String,
    pub account_type: AccountType,
}

impl Caller {
    pub fn new(username: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            username: username.into(),
            account_type,
        }
    }

    fn may_modify(&self, file: &File) -> bool {
        self.account_type == AccountType::SuperAdmin || file.uploader == self.username
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCatalog {
    files: BTreeMap<String, File>,
    transactions: Vec<Transaction>,
}

impl FileCatalog {
    pub fn get(&self, id: &str) -> Option<&File> {
        self.files.get(id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Identifiers of every file the catalog knows, in any state.
    pub fn known_ids(&self) -> BTreeSet<String> {
        self.files.keys().cloned().collect()
    }

    /// Inserts a freshly staged file.
    pub fn insert_staged(&mut self, file: File) -> Result<()> {
        if file.state != PublishState::Uploaded {
            return Err(AppError::WrongState(format!(
                "staged file {} is {:?}",
                file.id, file.state
            )));
        }
        if self.files.contains_key(&file.id) {
            return Err(AppError::Internal(format!("file id collision: {}", file.id)));
        }
        self.files.insert(file.id.clone(), file);
        Ok(())
    }

    /// The caller's staged file. Other users' staged files are reported as missing.
    pub fn staged(&self, username: &str, id: &str) -> Result<&File> {
        let file = self
            .files
            .get(id)
            .filter(|f| f.uploader == username)
            .ok_or(AppError::FileNotFound)?;

        if file.state != PublishState::Uploaded {
            return Err(AppError::WrongState(format!("file {} is {:?}", id, file.state)));
        }
        Ok(file)
    }

    /// Removes a staged file entry. No transaction is written.
    pub fn remove_staged(&mut self, username: &str, id: &str) -> Result<File> {
        self.staged(username, id)?;
        self.files.remove(id).ok_or(AppError::FileNotFound)
    }

    /// The user's staged files, newest first.
    pub fn list_staged(&self, username: &str) -> Vec<File> {
        let mut staged: Vec<File> = self
            .files
            .values()
            .filter(|f| f.state == PublishState::Uploaded && f.uploader == username)
            .cloned()
            .collect();
        sort_newest_first(&mut staged);
        staged
    }

    /// Validates a publish without mutating anything.
    pub fn check_publish(&self, username: &str, id: &str, metadata: &Metadata) -> Result<&File> {
        let file = self.staged(username, id)?;

        if metadata.tags.is_empty() {
            return Err(AppError::MissingField("tags".to_string()));
        }
        if metadata.people.is_empty() {
            return Err(AppError::MissingField("people".to_string()));
        }

        let duplicate = self
            .files
            .values()
            .any(|f| f.is_published() && f.id != file.id && f.hash == file.hash);
        if duplicate {
            return Err(AppError::DuplicateContent);
        }

        Ok(file)
    }

    /// Marks a checked file Published and appends the Create transaction.
    pub fn commit_publish(
        &mut self,
        id: &str,
        metadata: Metadata,
        version: &str,
    ) -> Result<Transaction> {
        let file = self.files.get_mut(id).ok_or(AppError::FileNotFound)?;
        file.state = PublishState::Published;
        file.metadata = metadata;

        Ok(self.append(id, TransactionKind::Create, version))
    }

    /// Applies a metadata delta to a published file.
    pub fn edit(
        &mut self,
        caller: &Caller,
        id: &str,
        delta: MetadataDelta,
        version: &str,
    ) -> Result<File> {
        let file = self.files.get(id).ok_or(AppError::FileNotFound)?;
        if file.state != PublishState::Published {
            return Err(AppError::WrongState(format!("file {} is {:?}", id, file.state)));
        }
        if !caller.may_modify(file) {
            return Err(AppError::Forbidden);
        }
        if delta.tags.as_ref().is_some_and(|t| t.is_empty()) {
            return Err(AppError::MissingField("tags".to_string()));
        }
        if delta.people.as_ref().is_some_and(|p| p.is_empty()) {
            return Err(AppError::MissingField("people".to_string()));
        }

        let file = self.files.get_mut(id).ok_or(AppError::FileNotFound)?;
        if let Some(description) = delta.description {
            file.metadata.description = description;
        }
        if let Some(tags) = delta.tags {
            file.metadata.tags = tags;
        }
        if let Some(people) = delta.people {
            file.metadata.people = people;
        }
        if let Some(date) = delta.date {
            file.metadata.date = date;
        }
        let edited = file.clone();

        self.append(id, TransactionKind::Edit, version);
        Ok(edited)
    }

    /// Validates a delete without mutating anything.
    pub fn check_delete(&self, caller: &Caller, id: &str, hard: bool) -> Result<&File> {
        let file = self.files.get(id).ok_or(AppError::FileNotFound)?;
        if file.state != PublishState::Published {
            return Err(AppError::WrongState(format!("file {} is {:?}", id, file.state)));
        }
        if hard && caller.account_type != AccountType::SuperAdmin {
            return Err(AppError::Forbidden);
        }
        if !caller.may_modify(file) {
            return Err(AppError::Forbidden);
        }
        Ok(file)
    }

    /// Marks a checked file Deleted and appends the Delete transaction.
    pub fn commit_delete(&mut self, id: &str, version: &str) -> Result<File> {
        let file = self.files.get_mut(id).ok_or(AppError::FileNotFound)?;
        file.state = PublishState::Deleted;
        let deleted = file.clone();

        self.append(id, TransactionKind::Delete, version);
        Ok(deleted)
    }

    fn append(&mut self, file_id: &str, kind: TransactionKind, version: &str) -> Transaction {
        let transaction = Transaction::new(file_id, kind, version);
        tracing::debug!("Transaction {:?} on {}", kind, file_id);
        self.transactions.push(transaction.clone());
        transaction
    }

    fn published(&self) -> impl Iterator<Item = &File> {
        self.files.values().filter(|f| f.is_published())
    }

    pub fn search(&self, query: &SearchQuery) -> SearchPage {
        let mut matches: Vec<File> = self
            .published()
            .filter(|f| matches_query(f, query))
            .cloned()
            .collect();
        sort_newest_first(&mut matches);
        paginate(matches, query.page, query.page_size)
    }

    /// Published files among `ids`, ordered and paginated like search.
    pub fn resolve<'a, I>(&self, ids: I, page: usize, page_size: usize) -> SearchPage
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut found: Vec<File> = ids
            .into_iter()
            .filter_map(|id| self.files.get(id))
            .filter(|f| f.is_published())
            .cloned()
            .collect();
        sort_newest_first(&mut found);
        paginate(found, page, page_size)
    }

    pub fn aggregate(&self, selector: AggregateSelector) -> Aggregate {
        let mut tags = BTreeSet::new();
        let mut people = BTreeSet::new();
        let mut file_types = BTreeSet::new();
        let mut dates = BTreeSet::new();

        for file in self.published() {
            if selector.tags {
                tags.extend(file.metadata.tags.iter().cloned());
            }
            if selector.people {
                people.extend(file.metadata.people.iter().cloned());
            }
            if selector.file_types {
                file_types.insert(file.class.as_str().to_string());
            }
            if selector.dates && !file.metadata.date.is_unset() {
                dates.insert(file.metadata.date);
            }
        }

        Aggregate {
            tags: selector.tags.then(|| tags.into_iter().collect()),
            people: selector.people.then(|| people.into_iter().collect()),
            file_types: selector.file_types.then(|| file_types.into_iter().collect()),
            dates: selector
                .dates
                .then(|| dates.into_iter().map(|d| d.format()).collect()),
        }
    }

    /// Up to `count` distinct published files chosen at random.
    pub fn random(&self, count: usize) -> Vec<File> {
        let published: Vec<&File> = self.published().collect();
        published
            .choose_multiple(&mut rand::thread_rng(), count)
            .map(|f| (*f).clone())
            .collect()
    }
}

fn matches_query(file: &File, query: &SearchQuery) -> bool {
    let meta = &file.metadata;

    if !query.description.is_empty()
        && !meta
            .description
            .to_lowercase()
            .contains(&query.description.to_lowercase())
    {
        return false;
    }
    if !query.tags.is_subset(&meta.tags) {
        return false;
    }
    if !query.people.is_subset(&meta.people) {
        return false;
    }
    if !query.min_date.is_unset() && meta.date < query.min_date {
        return false;
    }
    if !query.max_date.is_unset() && meta.date > query.max_date {
        return false;
    }
    query.classes.is_empty() || query.classes.contains(&file.class)
}

/// Newest first; ties broken by identifier ascending.
fn sort_newest_first(files: &mut [File]) {
    files.sort_by(|a, b| b.added_at.cmp(&a.added_at).then_with(|| a.id.cmp(&b.id)));
}

fn paginate(files: Vec<File>, page: usize, page_size: usize) -> SearchPage {
    let page = page.max(1);
    let page_size = if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size };
    let total = files.len();

    let views = files
        .iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .map(FileView::from)
        .collect();

    SearchPage {
        files: views,
        total,
        page,
        results_per_page: page_size,
    }
}
