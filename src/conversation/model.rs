use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::model::Message;
use crate::user;

use super::Id;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conv_id: Id,
    pub creator_id: user::Id,
    pub other_person_id: user::Id,
    pub display_name: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Loaded from the message sub-collection, stored documents keep it empty.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(conv_id: Id, creator_id: &user::Id, other_person_id: &user::Id, name: &str) -> Self {
        Self {
            conv_id,
            creator_id: creator_id.clone(),
            other_person_id: other_person_id.clone(),
            display_name: name.to_owned(),
            updated_at: None,
            messages: Vec::new(),
        }
    }

    pub fn with_messages(self, messages: Vec<Message>) -> Self {
        Self { messages, ..self }
    }

    pub(super) fn document(&self) -> Self {
        Self {
            messages: Vec::new(),
            ..self.clone()
        }
    }
}

/// Orders by creation time; messages created at the same instant keep send order.
pub(super) fn sort_by_creation(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.created_at);
}
