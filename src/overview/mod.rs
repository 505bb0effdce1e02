use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;

use axum::{Router, http::StatusCode, routing::get};
use futures::Stream;
use model::Overview;
use repository::OverviewRepository;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

mod handler;
pub mod model;
pub mod repository;

type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn OverviewRepository + Send + Sync>;
pub type OverviewStream = Pin<Box<dyn Stream<Item = Result<Vec<Overview>>> + Send>>;

const BLANK_USER_ID: &str = "user id cannot be blank";

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

pub fn api<S>(s: AppState) -> Router<S> {
    Router::new()
        .route("/users/{id}/overviews", get(handler::api::find_all))
        .with_state(s)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("overview listener closed")]
    ListenerClosed,

    #[error(transparent)]
    _Redis(#[from] redis::RedisError),
    #[error(transparent)]
    _ParseJson(#[from] serde_json::Error),
}

impl From<Error> for StatusCode {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::ListenerClosed | Error::_Redis(_) | Error::_ParseJson(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
