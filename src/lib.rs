use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;

use crate::integration::Env;
use crate::state::AppState;

pub mod conversation;
mod error;
pub mod event;
pub mod integration;
pub mod manager;
pub mod message;
pub mod overview;
pub mod state;
pub mod user;

pub type Result<T> = std::result::Result<T, error::Error>;
pub use error::Error;

pub fn app(state: AppState, env: &Env) -> Router {
    let api = Router::new()
        .merge(conversation::api(state.clone()))
        .merge(overview::api(state.clone()));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", api)
        .merge(event::endpoints(state))
        .layer(
            CorsLayer::new()
                .allow_origin(env.allow_origin())
                .allow_methods(env.allow_methods())
                .allow_headers(env.allow_headers()),
        )
}
