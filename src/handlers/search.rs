use std::collections::BTreeSet;

use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    handlers::files::parse_date,
    models::{
        file::{FileView, MediaClass, split_tokens},
        query::{AggregateSelector, DEFAULT_PAGE_SIZE, SearchQuery},
    },
    state::AppState,
    views,
};

/// Upper bound on `results_per_page` and `count`.
const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub desc: Option<String>,
    pub tags: Option<String>,
    pub people: Option<String>,
    pub min_date: Option<String>,
    pub max_date: Option<String>,
    pub file_types: Option<String>,
    pub results_per_page: Option<usize>,
    pub page: Option<usize>,
    pub format: Option<String>,
    pub pretty: Option<bool>,
}

impl SearchParams {
    /// Builds the catalog query. Bad dates or class names are field errors.
    pub fn to_query(&self) -> Result<SearchQuery> {
        let mut classes = BTreeSet::new();
        for name in self.file_types.as_deref().unwrap_or_default().split(',') {
            if name.trim().is_empty() {
                continue;
            }
            let class = MediaClass::parse(name)
                .ok_or_else(|| AppError::InvalidField("file_types".to_string()))?;
            classes.insert(class);
        }

        Ok(SearchQuery {
            description: self.desc.as_deref().unwrap_or_default().trim().to_string(),
            tags: split_tokens(self.tags.as_deref().unwrap_or_default()),
            people: split_tokens(self.people.as_deref().unwrap_or_default()),
            min_date: parse_date("min_date", self.min_date.as_deref().unwrap_or_default())?,
            max_date: parse_date("max_date", self.max_date.as_deref().unwrap_or_default())?,
            classes,
            page: self.page.unwrap_or(1).max(1),
            page_size: self
                .results_per_page
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        })
    }
}

#[derive(Deserialize)]
pub struct DataParams {
    pub fetch: Option<String>,
}

#[derive(Deserialize)]
pub struct RandomParams {
    pub count: Option<usize>,
}

/// Serializes with sonic-rs, optionally indented.
fn json_response<T: Serialize>(value: &T, pretty: bool) -> Result<Response> {
    let body = if pretty {
        sonic_rs::to_string_pretty(value)
    } else {
        sonic_rs::to_string(value)
    }
    .map_err(|e| AppError::Internal(format!("Response serialization failed: {}", e)))?;

    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// `GET /search`. `format` is `json` (default), `html_tiled` or `html_detailed`.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response> {
    let query = params.to_query()?;
    tracing::debug!(?query, "Search");
    let page = state.files.search(query).await?;

    match params.format.as_deref().unwrap_or("json") {
        "json" => json_response(&page, params.pretty.unwrap_or(false)),
        "html_tiled" => Ok(Html(views::tiled(&page)).into_response()),
        "html_detailed" => Ok(Html(views::detailed(&page)).into_response()),
        _ => Err(AppError::InvalidField("format".to_string())),
    }
}

/// `GET /data?fetch=tags,people,file_types,dates`.
pub async fn data(
    State(state): State<AppState>,
    Query(params): Query<DataParams>,
) -> Result<Response> {
    let fetch = params
        .fetch
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| AppError::MissingField("fetch".to_string()))?;
    let aggregate = state.files.aggregate(AggregateSelector::parse(&fetch)).await?;
    json_response(&aggregate, false)
}

/// `GET /random?count=N`, a uniform pick without replacement.
pub async fn random(
    State(state): State<AppState>,
    Query(params): Query<RandomParams>,
) -> Result<Json<Vec<FileView>>> {
    let count = params.count.unwrap_or(1).min(MAX_PAGE_SIZE);
    let files = state.files.random(count).await?;
    Ok(Json(files.iter().map(FileView::from).collect()))
}

/// The memory browser: the newest published files, tiled.
pub async fn browse(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Html<String>> {
    let page = state.files.search(params.to_query()?).await?;
    Ok(Html(views::layout(
        &state.config.brand_name,
        "Memories",
        &views::tiled(&page),
    )))
}
