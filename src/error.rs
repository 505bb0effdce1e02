use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;

use crate::{conversation, manager, overview};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    _Conversation(#[from] conversation::Error),
    #[error(transparent)]
    _Overview(#[from] overview::Error),
    #[error(transparent)]
    _Manager(#[from] manager::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("{self}");

        let message = self.to_string();
        let status: StatusCode = match self {
            Self::_Conversation(e) => e.into(),
            Self::_Overview(e) => e.into(),
            Self::_Manager(e) => e.into(),
        };

        if status.is_server_error() {
            return (status, "Internal server error".to_owned()).into_response();
        }

        (status, message).into_response()
    }
}
