use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::Result;
use crate::gallery;
use crate::state::AppState;

pub(crate) async fn list_by_project(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> Result<Response> {
    let images = gallery::list_images_by_project(&state.db, project_id).await?;
    Ok(Json(images).into_response())
}

pub(crate) async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response> {
    gallery::delete_image(&state.db, &state.store, id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "message": "Image deleted" })),
    )
        .into_response())
}
