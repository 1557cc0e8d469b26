use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::auth;
use crate::db::UserView;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterRequest {
    email: String,
    password: String,
    // accepted for API compatibility, not persisted
    #[allow(dead_code)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecoveryRequest {
    email: String,
}

pub(crate) async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response> {
    auth::register(&state.db, &req.email, &req.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "User created" })),
    )
        .into_response())
}

pub(crate) async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response> {
    let token = auth::login(&state.db, &state.signer, &req.email, &req.password).await?;
    Ok(Json(serde_json::json!({ "token": token })).into_response())
}

pub(crate) async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let user = auth::get_user(&state.db, &id).await?;
    Ok(Json(UserView::from(user)).into_response())
}

pub(crate) async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<LoginRequest>,
) -> Result<Response> {
    let user = auth::update_user(&state.db, &id, &req.email, &req.password).await?;
    Ok(Json(UserView::from(user)).into_response())
}

pub(crate) async fn recover_password(
    State(state): State<AppState>,
    Json(req): Json<RecoveryRequest>,
) -> Result<Response> {
    auth::recover_password(&state.db, &state.mailer, &req.email).await?;
    Ok(Json(serde_json::json!({ "message": "Email sent" })).into_response())
}
