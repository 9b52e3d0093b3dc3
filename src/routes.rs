use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{handlers, middleware_layer, state::AppState};

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Assembles the application router.
pub fn router(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.config.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let public_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/reset", get(handlers::auth::reset_page))
        .route("/reset/{kind}", post(handlers::auth::reset))
        .with_state(state.clone());

    let gated_routes = Router::new()
        .route(
            "/login",
            get(handlers::auth::login_page).post(handlers::auth::login),
        )
        .route("/logout", get(handlers::auth::logout))
        .route("/", get(handlers::search::browse))
        .route("/view", get(handlers::search::browse))
        .route("/search", get(handlers::search::search))
        .route("/data", get(handlers::search::data))
        .route("/random", get(handlers::search::random))
        .route("/upload", get(handlers::files::upload_page))
        .route(
            "/upload/temp",
            post(handlers::files::stage_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/upload/temp_delete", post(handlers::files::delete_staged))
        .route("/upload/publish", post(handlers::files::publish))
        .route("/edit", post(handlers::files::edit))
        .route("/delete", post(handlers::files::delete))
        .route("/favourite", post(handlers::files::favourite))
        .route("/favourites", get(handlers::files::favourites))
        .route(
            "/temp_uploaded/{owner}/{blob}",
            get(handlers::files::serve_staged),
        )
        .route("/users", get(handlers::users::users_page))
        .route(
            "/users/{username}/confirm",
            post(handlers::users::confirm_user),
        )
        .route("/users/{username}/block", post(handlers::users::block_user))
        .nest_service("/static", ServeDir::new(state.layout.static_dir()))
        .layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(gated_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
}
