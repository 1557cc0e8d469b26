use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::gallery::{self, CreateProject, FileUpload, UpdateProject};
use crate::state::AppState;

/// The only accepted query flag; anything else in the query string is
/// ignored.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct ListParams {
    #[serde(default)]
    images: bool,
}

pub(crate) async fn list_projects(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response> {
    let projects = gallery::list_projects(&state.db, params.images).await?;
    Ok(Json(serde_json::json!({ "projects": projects })).into_response())
}

pub(crate) async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response> {
    let project = gallery::get_project(&state.db, id).await?;
    Ok(Json(project).into_response())
}

#[tracing::instrument(skip(state, multipart))]
pub(crate) async fn create_project(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut title = None;
    let mut description = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        if let Some(filename) = field.file_name().map(str::to_owned) {
            let content_type = field.content_type().map(str::to_owned);
            let bytes = field.bytes().await?;
            tracing::info!("buffered upload {filename} ({} bytes)", bytes.len());
            files.push(FileUpload {
                filename,
                content_type,
                bytes,
            });
            continue;
        }
        match name.as_deref() {
            Some("title") => title = Some(field.text().await?),
            Some("description") => description = Some(field.text().await?),
            other => tracing::debug!("ignoring multipart field {other:?}"),
        }
    }

    let req = CreateProject {
        title: title.ok_or_else(|| AppError::Validation("title is required".to_string()))?,
        description: description
            .ok_or_else(|| AppError::Validation("description is required".to_string()))?,
        files,
    };

    let created = gallery::create_project(&state.db, &state.store, req).await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

pub(crate) async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<UpdateProject>,
) -> Result<Response> {
    let project = gallery::update_project(&state.db, id, update).await?;
    Ok(Json(project).into_response())
}

pub(crate) async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response> {
    gallery::delete_project(&state.db, &state.store, id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "message": "Project deleted" })),
    )
        .into_response())
}
