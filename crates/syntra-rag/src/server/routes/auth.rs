//! Registration, login and token refresh

use axum::{extract::State, http::StatusCode, Form, Json};

use crate::auth::CurrentUser;
use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{LoginForm, RefreshTokenRequest, Token, UserCreate, UserResponse};

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let user = state.auth().register(&payload)?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// POST /auth/login - OAuth2 password form, `username` carries the email
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<Token>> {
    let token = state.auth().login(&form.username, &form.password)?;
    tracing::info!("User {} logged in", token.user.id);
    Ok(Json(token))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<Token>> {
    state.auth().refresh(&request.refresh_token).map(Json)
}

/// GET /auth/me
pub async fn me(current: CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from(current.user()))
}
