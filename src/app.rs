use axum::extract::DefaultBodyLimit;
use axum::{routing, Router};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{image, project, user};
use crate::state::AppState;

// same cap as the original multipart config
const MAX_BODY_BYTES: usize = 100_000_000;

pub fn build(state: AppState) -> Router<()> {
    let service = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());
    Router::new()
        .route(
            "/projects",
            routing::get(project::list_projects).post(project::create_project),
        )
        .route(
            "/projects/:id",
            routing::get(project::get_project)
                .put(project::update_project)
                .delete(project::delete_project),
        )
        .route("/image/:project_id", routing::get(image::list_by_project))
        .route("/image/delete/:id", routing::delete(image::delete_image))
        .route("/register", routing::post(user::register))
        .route("/login", routing::post(user::login))
        .route(
            "/user/:id",
            routing::get(user::get_user).put(user::update_user),
        )
        .route("/recovery", routing::post(user::recover_password))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(service)
        .with_state(state)
}
