use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod trash;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::task_routes())
        .merge(handlers::trash_routes())
}
