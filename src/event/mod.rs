use axum::Router;
use axum::routing::get;

use crate::state::AppState;

mod handler;

pub fn endpoints<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/ws/conversations/{id}/messages", get(handler::messages))
        .route("/ws/users/{id}/overviews", get(handler::overviews))
        .with_state(state)
}
