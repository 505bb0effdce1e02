use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user;

use super::Id;

const SYSTEM_SENDER: &str = "system";
const DELETED_MESSAGE_ID: &str = "deleted-system-msg";

/// A single chat message. Never mutated after it has been sent.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub msg_id: Id,
    pub content: String,
    pub sender_id: user::Id,
    pub receiver_id: user::Id,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(msg_id: Id, sender_id: &user::Id, receiver_id: &user::Id, content: &str) -> Self {
        Self {
            msg_id,
            content: content.to_owned(),
            sender_id: sender_id.clone(),
            receiver_id: receiver_id.clone(),
            created_at: Utc::now(),
        }
    }

    /// Placeholder shown to a participant whose counterpart deleted the conversation.
    pub fn conversation_deleted(receiver_id: &user::Id) -> Self {
        Self::new(
            Id::from(DELETED_MESSAGE_ID),
            &user::Id::from(SYSTEM_SENDER),
            receiver_id,
            "Conversation deleted",
        )
    }

    pub fn is_system(&self) -> bool {
        self.sender_id.as_str() == SYSTEM_SENDER
    }
}
