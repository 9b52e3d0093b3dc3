use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::{Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::state::AppState;

/// Body returned for refused listings and foreign staging areas.
pub const NOT_FOUND_BODY: &str = "404 page not found";

/// The request gate wrapped around every route.
///
/// In order:
/// 1. paths ending in `/` (other than `/`) are refused;
/// 2. `/static/...` outside `/static/content` is public;
/// 3. `/temp_uploaded/{user}/...` is served only to `{user}`;
/// 4. `/login` while already authenticated redirects (GET) or says so (POST);
/// 5. everything else needs an authenticated session whose user may still
///    sign in; a user blocked after login loses access on the next request.
///
/// The session's `User` is put in the request extensions for handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().clone();

    if path.len() > 1 && path.ends_with('/') {
        tracing::debug!("Refusing directory path {}", path);
        return not_found();
    }

    let is_content = path == "/static/content" || path.starts_with("/static/content/");
    if path.starts_with("/static/") && !is_content {
        return next.run(request).await;
    }

    if let Some(rest) = path.strip_prefix("/temp_uploaded/") {
        let owner = rest.split('/').next().unwrap_or_default();
        return match state.sessions.session_user(&cookies, &state.users) {
            Ok(user) if user.username == owner => {
                request.extensions_mut().insert(user);
                next.run(request).await
            }
            Ok(user) => {
                tracing::warn!(
                    "{} asked for the staging area of {}",
                    user.username,
                    owner
                );
                not_found()
            }
            Err(_) => reject(&method),
        };
    }

    if !state.sessions.authenticate(&cookies) {
        return if path == "/login" {
            next.run(request).await
        } else {
            reject(&method)
        };
    }

    let session_user = state.sessions.session_user(&cookies, &state.users);

    if path == "/login" {
        return match session_user {
            Ok(_) if is_read(&method) => redirect("/"),
            Ok(_) => (StatusCode::OK, "already authenticated").into_response(),
            Err(_) => next.run(request).await,
        };
    }

    match session_user {
        Ok(user) => {
            tracing::debug!("Authenticated {} for {}", user.username, path);
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!("Session refused for {}: {}", path, e);
            reject(&method)
        }
    }
}

fn is_read(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
}

/// A 302 to `location`.
pub fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn reject(method: &Method) -> Response {
    if is_read(method) {
        redirect("/login")
    } else {
        (StatusCode::UNAUTHORIZED, "unauthorised").into_response()
    }
}
