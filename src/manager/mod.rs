use std::sync::Arc;

use axum::http::StatusCode;
use service::ConversationManager;

use crate::{conversation, overview, user};

pub mod service;

type Result<T> = std::result::Result<T, Error>;
pub type Service = Arc<dyn ConversationManager + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("user {0} cannot start a conversation with themselves")]
    SelfConversation(user::Id),

    #[error(transparent)]
    _Conversation(#[from] conversation::Error),
    #[error(transparent)]
    _Overview(#[from] overview::Error),
}

impl From<Error> for StatusCode {
    fn from(e: Error) -> Self {
        match e {
            Error::SelfConversation(_) => StatusCode::BAD_REQUEST,
            Error::_Conversation(e) => e.into(),
            Error::_Overview(e) => e.into(),
        }
    }
}
