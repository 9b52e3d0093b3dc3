use axum::{
    Extension, Json,
    extract::{Path, State},
    response::Html,
};

use crate::{
    error::{AppError, Result},
    models::user::{AccountType, RegistrationState, User, UserView},
    state::AppState,
    views,
};

/// Lists users.
pub async fn users_page(State(state): State<AppState>) -> Result<Html<String>> {
    let users: Vec<UserView> = state.users.list()?.iter().map(UserView::from).collect();
    Ok(Html(views::layout(
        &state.config.brand_name,
        "Users",
        &views::users_body(&users),
    )))
}

/// Admin confirmation step of registration.
pub async fn confirm_user(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Path(username): Path<String>,
) -> Result<Json<UserView>> {
    require_admin(&caller)?;
    let user = state
        .users
        .transition(&username, RegistrationState::confirm_by_admin)?;
    state.persist_users().await;
    Ok(Json(UserView::from(&user)))
}

/// Blocks a user from logging in.
pub async fn block_user(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Path(username): Path<String>,
) -> Result<Json<UserView>> {
    require_admin(&caller)?;
    if caller.username == username {
        return Err(AppError::InvalidRequest("Cannot block yourself".to_string()));
    }
    let target = state.users.get(&username)?;
    if target.account_type == AccountType::SuperAdmin && caller.account_type != AccountType::SuperAdmin {
        tracing::warn!("{} tried to block super admin {}", caller.username, username);
        return Err(AppError::Forbidden);
    }
    let user = state
        .users
        .transition(&username, |_| RegistrationState::Blocked)?;
    state.persist_users().await;
    Ok(Json(UserView::from(&user)))
}

fn require_admin(caller: &User) -> Result<()> {
    if caller.account_type.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
