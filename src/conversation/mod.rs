use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post, put},
};
use futures::Stream;
use repository::ConversationRepository;
use serde::{Deserialize, Serialize};

use crate::message::{self, model::Message};
use crate::state::AppState;

mod handler;
pub mod model;
pub mod repository;

type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn ConversationRepository + Send + Sync>;
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Vec<Message>>> + Send>>;

const BLANK_CONV_ID: &str = "conversation id cannot be blank";
const BLANK_MSG_ID: &str = "message id cannot be blank";

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
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
        .route("/conversations", post(handler::api::create))
        .route(
            "/conversations/{id}",
            get(handler::api::find_one).delete(handler::api::delete),
        )
        .route("/conversations/{id}/leave", post(handler::api::leave))
        .route("/conversations/{id}/messages", post(handler::api::send))
        .route("/conversations/{id}/read", put(handler::api::mark_read))
        .with_state(s)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("conversation not found: {0}")]
    NotFound(Id),
    #[error("message already exists: {0}")]
    DuplicateMessage(message::Id),
    #[error("message listener closed")]
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
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::DuplicateMessage(_) => StatusCode::CONFLICT,
            Error::ListenerClosed | Error::_Redis(_) | Error::_ParseJson(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
