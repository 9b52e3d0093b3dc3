use axum::{
    Form, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use zeroize::Zeroizing;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::redirect,
    models::user::{AccountType, RegistrationState},
    repositories::user::NewUser,
    state::AppState,
    views,
};

/// The form payload for login.
#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: Zeroizing<String>,
}

/// The form payload for self-registration.
#[derive(Deserialize)]
pub struct RegisterForm {
    pub forename: String,
    pub surname: String,
    pub email: String,
    pub password: Zeroizing<String>,
}

/// The form payload for both reset steps.
#[derive(Deserialize)]
pub struct ResetForm {
    pub email: String,
    pub temporary_password: Option<Zeroizing<String>>,
    pub new_password: Option<Zeroizing<String>>,
}

/// The response payload for account requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub username: String,
}

pub async fn login_page(State(state): State<AppState>) -> Html<String> {
    Html(views::login_form(&state.config.brand_name))
}

/// Handles login. Answers `success`, `unauthorised` or `error`.
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> Response {
    tracing::info!("🔐 Login attempt for {}", form.email);

    let result = state
        .sessions
        .login(&cookies, &state.users, &form.email, &form.password)
        .await;

    match result {
        Ok(_) => (StatusCode::OK, "success").into_response(),
        Err(AppError::Unauthorised | AppError::Forbidden | AppError::UserNotFound) => {
            tracing::warn!("❌ Login refused for {}", form.email);
            (StatusCode::UNAUTHORIZED, "unauthorised").into_response()
        }
        Err(e) => {
            tracing::error!("❌ Login failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "error").into_response()
        }
    }
}

/// Handles logout.
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Response {
    state.sessions.logout(&cookies);
    redirect("/login")
}

/// Creates an Unregistered Standard user awaiting confirmation.
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    let user = state
        .users
        .add_user(NewUser {
            forename: form.forename,
            surname: form.surname,
            email: form.email,
            password: form.password,
            account_type: AccountType::Standard,
            state: RegistrationState::Unregistered,
        })
        .await?;

    state.persist_users().await;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            username: user.username,
        }),
    )
        .into_response())
}

pub async fn reset_page(State(state): State<AppState>) -> Html<String> {
    Html(views::reset_form(&state.config.brand_name))
}

/// `request` issues a temporary password; `confirm` replaces the password.
pub async fn reset(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Form(form): Form<ResetForm>,
) -> Result<Json<AuthResponse>> {
    match kind.as_str() {
        "request" => {
            match state.users.issue_reset(&form.email).await {
                Ok((user, temporary)) => {
                    state.mailer.send_reset(&user.email, &temporary)?;
                    state.persist_users().await;
                }
                Err(AppError::UserNotFound) => {
                    tracing::debug!("Reset requested for unknown email");
                }
                Err(e) => return Err(e),
            }
            Ok(Json(AuthResponse {
                success: true,
                message: "If the address is registered a temporary password is on its way".to_string(),
            }))
        }
        "confirm" => {
            let temporary = form
                .temporary_password
                .filter(|p| !p.is_empty())
                .ok_or_else(|| AppError::MissingField("temporary_password".to_string()))?;
            let new_password = form
                .new_password
                .filter(|p| !p.is_empty())
                .ok_or_else(|| AppError::MissingField("new_password".to_string()))?;
            state
                .users
                .confirm_reset(&form.email, &temporary, &new_password)
                .await?;
            state.persist_users().await;
            Ok(Json(AuthResponse {
                success: true,
                message: "Password changed".to_string(),
            }))
        }
        other => Err(AppError::InvalidRequest(format!("Unknown reset step: {}", other))),
    }
}
