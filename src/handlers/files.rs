use axum::{
    Extension, Form, Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::NOT_FOUND_BODY,
    models::{
        file::{FileView, Metadata, MetadataDelta, MemoryDate, PublishState, split_tokens},
        query::{DEFAULT_PAGE_SIZE, SearchPage},
        user::User,
    },
    repositories::catalog::Caller,
    state::AppState,
    views,
};

#[derive(Deserialize)]
pub struct FileIdForm {
    pub file_id: String,
}

#[derive(Deserialize)]
pub struct PublishForm {
    pub file_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub people: String,
    #[serde(default)]
    pub date: String,
}

/// Absent fields are left untouched.
#[derive(Deserialize)]
pub struct EditForm {
    pub file_id: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub people: Option<String>,
    pub date: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteForm {
    pub file_id: String,
    pub hard: Option<bool>,
}

#[derive(Deserialize)]
pub struct FavouriteForm {
    pub file_id: String,
    pub action: String,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub results_per_page: Option<usize>,
}

/// Parses a `YYYY-MM-DD` field; empty means unset.
pub fn parse_date(field: &str, raw: &str) -> Result<MemoryDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(MemoryDate::default());
    }
    MemoryDate::parse(raw).ok_or_else(|| AppError::InvalidField(field.to_string()))
}

fn caller(user: &User) -> Caller {
    Caller::new(user.username.clone(), user.account_type)
}

/// The upload page with the caller's staged files.
pub async fn upload_page(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Html<String>> {
    let staged: Vec<FileView> = state
        .files
        .list_staged(&user.username)
        .await?
        .iter()
        .map(FileView::from)
        .collect();

    Ok(Html(views::layout(
        &state.config.brand_name,
        "Upload",
        &views::upload_body(&staged),
    )))
}

/// Stages the single `file` part of a multipart body.
pub async fn stage_upload(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let max = state.config.max_upload_size;

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, max))? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::MissingField("file".to_string()))?;
        let data = field.bytes().await.map_err(|e| multipart_error(e, max))?;

        tracing::info!(
            "📤 Staging {} ({} bytes) for {}",
            filename,
            data.len(),
            user.username
        );

        let file = state.files.stage(&user.username, &filename, data).await?;
        return Ok((StatusCode::CREATED, Json(FileView::from(&file))));
    }

    Err(AppError::MissingField("file".to_string()))
}

fn multipart_error(e: axum::extract::multipart::MultipartError, max: u64) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::TooLarge { size: max + 1, max }
    } else {
        AppError::InvalidRequest(e.body_text())
    }
}

pub async fn delete_staged(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Form(form): Form<FileIdForm>,
) -> Result<Json<FileView>> {
    let file = state.files.delete_staged(&user.username, &form.file_id).await?;
    Ok(Json(FileView::from(&file)))
}

/// Commits a staged file with its metadata.
pub async fn publish(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Form(form): Form<PublishForm>,
) -> Result<Json<FileView>> {
    let metadata = Metadata {
        description: form.description.trim().to_string(),
        tags: split_tokens(&form.tags),
        people: split_tokens(&form.people),
        date: parse_date("date", &form.date)?,
    };

    let file = state
        .files
        .publish(&user.username, &form.file_id, metadata)
        .await?;
    tracing::info!("✅ {} published {}", user.username, file.id);
    Ok(Json(FileView::from(&file)))
}

pub async fn edit(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Form(form): Form<EditForm>,
) -> Result<Json<FileView>> {
    let delta = MetadataDelta {
        description: form.description.map(|d| d.trim().to_string()),
        tags: form.tags.as_deref().map(split_tokens),
        people: form.people.as_deref().map(split_tokens),
        date: form.date.as_deref().map(|d| parse_date("date", d)).transpose()?,
    };

    let file = state.files.edit(caller(&user), &form.file_id, delta).await?;
    Ok(Json(FileView::from(&file)))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Form(form): Form<DeleteForm>,
) -> Result<Json<FileView>> {
    let hard = form.hard.unwrap_or(false);
    let file = state.files.delete(caller(&user), &form.file_id, hard).await?;
    tracing::info!(
        "🗑️ {} deleted {} (hard: {})",
        user.username,
        file.id,
        hard
    );
    Ok(Json(FileView::from(&file)))
}

/// Streams a staged blob to its uploader. The gate has already matched
/// the session user against `owner`.
pub async fn serve_staged(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((owner, blob)): Path<(String, String)>,
) -> Response {
    let id = blob.split('.').next().unwrap_or_default();

    let file = match state.files.get(id).await {
        Ok(file)
            if file.state == PublishState::Uploaded
                && file.uploader == owner
                && file.uploader == user.username
                && file.blob_name() == blob =>
        {
            file
        }
        Ok(_) | Err(AppError::FileNotFound) => return not_found(),
        Err(e) => return e.into_response(),
    };

    let path = match state.layout.staged_blob(&file.uploader, &file.blob_name()) {
        Ok(path) => path,
        Err(_) => return not_found(),
    };

    match tokio::fs::File::open(&path).await {
        Ok(handle) => {
            let body = Body::from_stream(ReaderStream::new(handle));
            (
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::CONTENT_LENGTH, file.size.to_string()),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Staged blob {} unreadable: {}", path.display(), e);
            not_found()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
}

/// `action` is `add` or `remove`. Only Published files can be added.
pub async fn favourite(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Form(form): Form<FavouriteForm>,
) -> Result<Json<Vec<String>>> {
    let add = match form.action.as_str() {
        "add" => true,
        "remove" => false,
        _ => return Err(AppError::InvalidField("action".to_string())),
    };

    if add && !state.files.get(&form.file_id).await?.is_published() {
        return Err(AppError::FileNotFound);
    }

    let updated = state.users.set_favourite(&user.username, &form.file_id, add)?;
    state.persist_users().await;
    Ok(Json(updated.favourites.into_iter().collect()))
}

/// The caller's favourites that are still published, ordered like search.
pub async fn favourites(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<PageQuery>,
) -> Result<Json<SearchPage>> {
    let current = state.users.get(&user.username)?;
    let page = state
        .files
        .resolve(
            current.favourites.into_iter().collect(),
            query.page.unwrap_or(1),
            query.results_per_page.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(page))
}
