//! The File Store: a single worker task owns the catalog and the blob
//! trees, and drains one request channel in arrival order.
//!
//! Callers hold a cloneable [`FileStore`] handle. Each request carries a
//! oneshot reply; if the caller has gone away the operation still runs to
//! completion and its reply is dropped.

use std::collections::BTreeSet;
use std::path::Path;

use axum::body::Bytes;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{
    config::FormatLists,
    error::{AppError, Result},
    models::{
        file::{File, Metadata, MetadataDelta, PublishState, Transaction, new_id, now_nanos},
        query::{Aggregate, AggregateSelector, SearchPage, SearchQuery},
    },
    repositories::{
        catalog::{Caller, FileCatalog},
        codec,
        layout::BlobLayout,
    },
    validation::media::classify_upload,
};

/// Queue depth of the request channel.
const REQUEST_QUEUE: usize = 256;

/// What the worker needs from the configuration.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Stamped on every transaction.
    pub version: String,
    pub max_upload_size: u64,
    pub formats: FormatLists,
}

/// One operation on the store.
#[derive(Debug)]
pub enum AccessRequest {
    Stage {
        uploader: String,
        filename: String,
        data: Bytes,
    },
    DeleteStaged {
        username: String,
        file_id: String,
    },
    Publish {
        username: String,
        file_id: String,
        metadata: Metadata,
    },
    Edit {
        caller: Caller,
        file_id: String,
        delta: MetadataDelta,
    },
    Delete {
        caller: Caller,
        file_id: String,
        hard: bool,
    },
    Get {
        file_id: String,
    },
    ListStaged {
        username: String,
    },
    Search(SearchQuery),
    Aggregate(AggregateSelector),
    Random(usize),
    Resolve {
        ids: Vec<String>,
        page: usize,
        page_size: usize,
    },
    Transactions,
    KnownIds,
    Serialize,
}

/// The result of one operation.
#[derive(Debug)]
pub enum AccessResponse {
    File(File),
    Files(Vec<File>),
    Page(SearchPage),
    Metadata(Aggregate),
    Transactions(Vec<Transaction>),
    Ids(BTreeSet<String>),
    Done,
}

struct Envelope {
    request: AccessRequest,
    reply: oneshot::Sender<Result<AccessResponse>>,
}

/// Handle to the File Store worker.
#[derive(Clone)]
pub struct FileStore {
    tx: mpsc::Sender<Envelope>,
}

impl FileStore {
    /// Loads `db/file_db.dat` (initialising it when absent) and spawns the worker.
    pub async fn open(layout: BlobLayout, settings: StoreSettings) -> Result<(Self, JoinHandle<()>)> {
        let catalog: FileCatalog =
            codec::load_or_init(&layout.file_db_path(), codec::FILE_DB_MAGIC).await?;
        tracing::info!(
            files = catalog.len(),
            transactions = catalog.transactions().len(),
            "File store loaded"
        );

        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        let worker = Worker {
            catalog,
            layout,
            settings,
            dirty: false,
        };
        let handle = tokio::spawn(worker.run(rx));

        Ok((Self { tx }, handle))
    }

    /// Submits a request and waits for its response.
    pub async fn access(&self, request: AccessRequest) -> Result<AccessResponse> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| AppError::Internal("File store worker stopped".to_string()))?;
        response
            .await
            .map_err(|_| AppError::Internal("File store worker dropped a request".to_string()))?
    }

    pub async fn stage(&self, uploader: &str, filename: &str, data: Bytes) -> Result<File> {
        let response = self
            .access(AccessRequest::Stage {
                uploader: uploader.to_string(),
                filename: filename.to_string(),
                data,
            })
            .await?;
        expect_file(response)
    }

    pub async fn delete_staged(&self, username: &str, file_id: &str) -> Result<File> {
        let response = self
            .access(AccessRequest::DeleteStaged {
                username: username.to_string(),
                file_id: file_id.to_string(),
            })
            .await?;
        expect_file(response)
    }

    pub async fn publish(&self, username: &str, file_id: &str, metadata: Metadata) -> Result<File> {
        let response = self
            .access(AccessRequest::Publish {
                username: username.to_string(),
                file_id: file_id.to_string(),
                metadata,
            })
            .await?;
        expect_file(response)
    }

    pub async fn edit(&self, caller: Caller, file_id: &str, delta: MetadataDelta) -> Result<File> {
        let response = self
            .access(AccessRequest::Edit {
                caller,
                file_id: file_id.to_string(),
                delta,
            })
            .await?;
        expect_file(response)
    }

    pub async fn delete(&self, caller: Caller, file_id: &str, hard: bool) -> Result<File> {
        let response = self
            .access(AccessRequest::Delete {
                caller,
                file_id: file_id.to_string(),
                hard,
            })
            .await?;
        expect_file(response)
    }

    pub async fn get(&self, file_id: &str) -> Result<File> {
        let response = self
            .access(AccessRequest::Get {
                file_id: file_id.to_string(),
            })
            .await?;
        expect_file(response)
    }

    pub async fn list_staged(&self, username: &str) -> Result<Vec<File>> {
        match self
            .access(AccessRequest::ListStaged {
                username: username.to_string(),
            })
            .await?
        {
            AccessResponse::Files(files) => Ok(files),
            other => Err(unexpected(other)),
        }
    }

    pub async fn search(&self, query: SearchQuery) -> Result<SearchPage> {
        expect_page(self.access(AccessRequest::Search(query)).await?)
    }

    pub async fn aggregate(&self, selector: AggregateSelector) -> Result<Aggregate> {
        match self.access(AccessRequest::Aggregate(selector)).await? {
            AccessResponse::Metadata(aggregate) => Ok(aggregate),
            other => Err(unexpected(other)),
        }
    }

    pub async fn random(&self, count: usize) -> Result<Vec<File>> {
        match self.access(AccessRequest::Random(count)).await? {
            AccessResponse::Files(files) => Ok(files),
            other => Err(unexpected(other)),
        }
    }

    /// Published files among `ids`, for favourites pages.
    pub async fn resolve(&self, ids: Vec<String>, page: usize, page_size: usize) -> Result<SearchPage> {
        expect_page(
            self.access(AccessRequest::Resolve {
                ids,
                page,
                page_size,
            })
            .await?,
        )
    }

    pub async fn transactions(&self) -> Result<Vec<Transaction>> {
        match self.access(AccessRequest::Transactions).await? {
            AccessResponse::Transactions(log) => Ok(log),
            other => Err(unexpected(other)),
        }
    }

    /// Every identifier in the catalog, in any state.
    pub async fn known_ids(&self) -> Result<BTreeSet<String>> {
        match self.access(AccessRequest::KnownIds).await? {
            AccessResponse::Ids(ids) => Ok(ids),
            other => Err(unexpected(other)),
        }
    }

    /// Flushes the catalog to `db/file_db.dat`.
    pub async fn serialize(&self) -> Result<()> {
        match self.access(AccessRequest::Serialize).await? {
            AccessResponse::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn expect_file(response: AccessResponse) -> Result<File> {
    match response {
        AccessResponse::File(file) => Ok(file),
        other => Err(unexpected(other)),
    }
}

fn expect_page(response: AccessResponse) -> Result<SearchPage> {
    match response {
        AccessResponse::Page(page) => Ok(page),
        other => Err(unexpected(other)),
    }
}

fn unexpected(response: AccessResponse) -> AppError {
    AppError::Internal(format!("Unexpected file store response: {:?}", response))
}

struct Worker {
    catalog: FileCatalog,
    layout: BlobLayout,
    settings: StoreSettings,
    /// Set when a flush failed; retried on the next flush.
    dirty: bool,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Envelope>) {
        tracing::debug!("File store worker started");

        while let Some(Envelope { request, reply }) = rx.recv().await {
            let result = self.handle(request).await;
            if reply.send(result).is_err() {
                tracing::debug!("File store caller went away before the reply");
            }
        }

        if self.dirty {
            if let Err(e) = self.flush().await {
                tracing::error!("Final file catalog flush failed: {}", e);
            }
        }
        tracing::debug!("File store worker stopped");
    }

    async fn handle(&mut self, request: AccessRequest) -> Result<AccessResponse> {
        match request {
            AccessRequest::Stage {
                uploader,
                filename,
                data,
            } => self.stage(&uploader, &filename, data).await.map(AccessResponse::File),
            AccessRequest::DeleteStaged { username, file_id } => self
                .delete_staged(&username, &file_id)
                .await
                .map(AccessResponse::File),
            AccessRequest::Publish {
                username,
                file_id,
                metadata,
            } => self
                .publish(&username, &file_id, metadata)
                .await
                .map(AccessResponse::File),
            AccessRequest::Edit {
                caller,
                file_id,
                delta,
            } => {
                let edited = self
                    .catalog
                    .edit(&caller, &file_id, delta, &self.settings.version)?;
                self.persist().await;
                Ok(AccessResponse::File(edited))
            }
            AccessRequest::Delete {
                caller,
                file_id,
                hard,
            } => self
                .delete(&caller, &file_id, hard)
                .await
                .map(AccessResponse::File),
            AccessRequest::Get { file_id } => self
                .catalog
                .get(&file_id)
                .cloned()
                .map(AccessResponse::File)
                .ok_or(AppError::FileNotFound),
            AccessRequest::ListStaged { username } => {
                Ok(AccessResponse::Files(self.catalog.list_staged(&username)))
            }
            AccessRequest::Search(query) => Ok(AccessResponse::Page(self.catalog.search(&query))),
            AccessRequest::Aggregate(selector) => {
                Ok(AccessResponse::Metadata(self.catalog.aggregate(selector)))
            }
            AccessRequest::Random(count) => Ok(AccessResponse::Files(self.catalog.random(count))),
            AccessRequest::Resolve {
                ids,
                page,
                page_size,
            } => Ok(AccessResponse::Page(self.catalog.resolve(&ids, page, page_size))),
            AccessRequest::Transactions => Ok(AccessResponse::Transactions(
                self.catalog.transactions().to_vec(),
            )),
            AccessRequest::KnownIds => Ok(AccessResponse::Ids(self.catalog.known_ids())),
            AccessRequest::Serialize => {
                self.flush().await?;
                Ok(AccessResponse::Done)
            }
        }
    }

    async fn stage(&mut self, uploader: &str, filename: &str, data: Bytes) -> Result<File> {
        let kind = classify_upload(
            filename,
            data.len() as u64,
            self.settings.max_upload_size,
            &self.settings.formats,
        )?;

        let file = File {
            id: new_id(),
            name: kind.name,
            extension: kind.extension,
            added_at: now_nanos(),
            uploader: uploader.to_string(),
            state: PublishState::Uploaded,
            class: kind.class,
            hash: hex::encode(Sha256::digest(&data)),
            size: data.len() as u64,
            metadata: Metadata::default(),
        };

        let dir = self.layout.user_temp_dir(uploader)?;
        let path = self.layout.staged_blob(uploader, &file.blob_name())?;
        tokio::fs::create_dir_all(&dir).await?;
        write_blob(&path, &data).await?;

        if let Err(e) = self.catalog.insert_staged(file.clone()) {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }

        tracing::info!(
            file_id = %file.id,
            uploader = %uploader,
            size = file.size,
            "Staged upload"
        );
        Ok(file)
    }

    async fn delete_staged(&mut self, username: &str, file_id: &str) -> Result<File> {
        let blob_name = self.catalog.staged(username, file_id)?.blob_name();
        let path = self.layout.staged_blob(username, &blob_name)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Staged blob already gone: {}", path.display());
            }
            Err(e) => return Err(AppError::Io(e)),
        }

        let removed = self.catalog.remove_staged(username, file_id)?;
        tracing::info!(file_id = %file_id, "Removed staged upload");
        Ok(removed)
    }

    async fn publish(&mut self, username: &str, file_id: &str, metadata: Metadata) -> Result<File> {
        let blob_name = self
            .catalog
            .check_publish(username, file_id, &metadata)?
            .blob_name();

        let from = self.layout.staged_blob(username, &blob_name)?;
        let to = self.layout.published_blob(&blob_name)?;
        tokio::fs::create_dir_all(self.layout.content_dir()).await?;
        tokio::fs::rename(&from, &to).await.map_err(|e| {
            tracing::error!("Moving {} to content failed: {}", from.display(), e);
            AppError::Io(e)
        })?;

        let transaction = self
            .catalog
            .commit_publish(file_id, metadata, &self.settings.version)?;
        tracing::info!(
            file_id = %file_id,
            transaction = %transaction.id,
            "Published file"
        );

        self.persist().await;
        self.catalog.get(file_id).cloned().ok_or(AppError::FileNotFound)
    }

    async fn delete(&mut self, caller: &Caller, file_id: &str, hard: bool) -> Result<File> {
        let blob_name = self.catalog.check_delete(caller, file_id, hard)?.blob_name();
        let published = self.layout.published_blob(&blob_name)?;

        if hard {
            match tokio::fs::remove_file(&published).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!("Published blob already gone: {}", published.display());
                }
                Err(e) => return Err(AppError::Io(e)),
            }
        } else {
            let parked = self.layout.deleted_blob(&blob_name)?;
            tokio::fs::create_dir_all(self.layout.deleted_dir()).await?;
            tokio::fs::rename(&published, &parked).await?;
        }

        let deleted = self.catalog.commit_delete(file_id, &self.settings.version)?;
        tracing::info!(file_id = %file_id, hard, by = %caller.username, "Deleted file");

        self.persist().await;
        Ok(deleted)
    }

    /// Flush after a public catalog change; failures are logged and retried later.
    async fn persist(&mut self) {
        if let Err(e) = self.flush().await {
            tracing::error!("File catalog flush failed, will retry: {}", e);
        }
    }

    async fn flush(&mut self) -> Result<()> {
        match codec::write(&self.layout.file_db_path(), codec::FILE_DB_MAGIC, &self.catalog).await {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                self.dirty = true;
                Err(e)
            }
        }
    }
}

/// Writes `data` to `path`; a failed write leaves nothing behind.
async fn write_blob(path: &Path, data: &[u8]) -> Result<()> {
    if let Err(e) = tokio::fs::write(path, data).await {
        if let Err(cleanup) = tokio::fs::remove_file(path).await {
            tracing::debug!("No partial blob to remove at {}: {}", path.display(), cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}
