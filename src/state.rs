use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    config::Config,
    crypto::{password::PasswordHasher, session_key},
    error::Result,
    repositories::{
        file::{FileStore, StoreSettings},
        layout::BlobLayout,
        user::UserStore,
    },
    services::{
        auth::SessionAuthority,
        mail::{LogMailer, Mailer},
    },
};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// On-disk layout under the data root.
    pub layout: BlobLayout,
    /// Handle to the single-writer file store.
    pub files: FileStore,
    /// The mutex-guarded user store.
    pub users: UserStore,
    /// Signed cookie sessions.
    pub sessions: SessionAuthority,
    /// Password reset delivery.
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Creates a new `AppState`, loading every catalog under `layout`.
    ///
    /// Returns the state and the file store worker's handle.
    pub async fn new(config: Config, layout: BlobLayout) -> Result<(Self, JoinHandle<()>)> {
        layout.ensure().await?;

        let key = session_key::load_or_create(&layout.session_key_path()).await?;
        let sessions = SessionAuthority::new(
            key,
            config.max_session_age,
            config.allow_unregistered_login,
        );
        tracing::info!("✅ Session authority initialized");

        let hasher = PasswordHasher::new(
            config.password_hash_memory_kib,
            config.password_hash_iterations,
        );
        let users = UserStore::open(&layout, hasher).await?;
        tracing::info!("✅ User store initialized");

        let (files, worker) = FileStore::open(
            layout.clone(),
            StoreSettings {
                version: config.version.clone(),
                max_upload_size: config.max_upload_size,
                formats: config.formats.clone(),
            },
        )
        .await?;
        tracing::info!("✅ File store worker started");

        let mailer: Arc<dyn Mailer> = Arc::new(LogMailer::new(config.smtp.clone()));

        Ok((
            AppState {
                config: Arc::new(config),
                layout,
                files,
                users,
                sessions,
                mailer,
            },
            worker,
        ))
    }

    /// Flushes both stores. Favourites naming unknown files are pruned.
    pub async fn serialize(&self) -> Result<()> {
        self.files.serialize().await?;
        let known = self.files.known_ids().await?;
        self.users.serialize(&known).await?;
        tracing::info!("✅ Catalogs serialized");
        Ok(())
    }

    /// Writes the user catalog after an account change. Failures are logged.
    pub async fn persist_users(&self) {
        let known = match self.files.known_ids().await {
            Ok(known) => known,
            Err(e) => {
                tracing::error!("Failed to read file ids before user flush: {}", e);
                return;
            }
        };
        if let Err(e) = self.users.serialize(&known).await {
            tracing::error!("Failed to persist users: {}", e);
        }
    }
}
