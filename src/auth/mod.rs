use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod engine;
pub(crate) mod extractors;
pub mod handlers;
pub mod linker;
pub mod password;
pub mod reset;
pub mod tokens;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
