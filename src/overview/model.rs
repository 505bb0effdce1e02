use serde::{Deserialize, Serialize};

use crate::conversation;
use crate::message::model::Message;
use crate::user;

use super::Id;

/// One participant's summary row of a conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    #[serde(default)]
    pub overview_id: Id,
    pub linked_conv_id: conversation::Id,
    pub conv_name: String,
    #[serde(default)]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub unread_count: u32,
    pub owner_id: user::Id,
    pub other_person_id: user::Id,
}

impl Overview {
    /// Fresh record without an id; the repository assigns one on upsert.
    pub fn new(
        linked_conv_id: &conversation::Id,
        conv_name: &str,
        owner_id: &user::Id,
        other_person_id: &user::Id,
    ) -> Self {
        Self {
            overview_id: Id::default(),
            linked_conv_id: linked_conv_id.clone(),
            conv_name: conv_name.to_owned(),
            last_message: None,
            unread_count: 0,
            owner_id: owner_id.clone(),
            other_person_id: other_person_id.clone(),
        }
    }

    pub fn with_id(self, overview_id: Id) -> Self {
        Self {
            overview_id,
            ..self
        }
    }

    pub fn involves(&self, user_id: &user::Id) -> bool {
        &self.owner_id == user_id || &self.other_person_id == user_id
    }

    pub fn belongs_to(&self, conv_id: &conversation::Id, owner_id: &user::Id) -> bool {
        &self.linked_conv_id == conv_id && &self.owner_id == owner_id
    }
}

/// Most recent last message first. Records without one go last, ties by id.
pub fn sort_by_recent_activity(overviews: &mut [Overview]) {
    overviews.sort_by(|a, b| {
        let a_at = a.last_message.as_ref().map(|m| m.created_at);
        let b_at = b.last_message.as_ref().map(|m| m.created_at);
        b_at.cmp(&a_at)
            .then_with(|| a.overview_id.cmp(&b.overview_id))
    });
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use crate::message;

    use super::*;

    fn overview(id: &str, last_message: Option<Message>) -> Overview {
        Overview {
            last_message,
            ..Overview::new(
                &conversation::Id::from("c1"),
                "Chat",
                &user::Id::from("jora"),
                &user::Id::from("valera"),
            )
        }
        .with_id(Id::from(id))
    }

    fn message(age_secs: i64) -> Message {
        let mut m = Message::new(
            message::Id::random(),
            &user::Id::from("jora"),
            &user::Id::from("valera"),
            "hi",
        );
        m.created_at -= Duration::seconds(age_secs);
        m
    }

    #[test]
    fn should_sort_by_recent_activity() {
        let mut overviews = vec![
            overview("a", None),
            overview("b", Some(message(60))),
            overview("c", Some(message(1))),
            overview("d", None),
        ];

        sort_by_recent_activity(&mut overviews);

        let ids = overviews
            .iter()
            .map(|o| o.overview_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["c", "b", "a", "d"]);
    }

    #[test]
    fn should_check_participants() {
        let o = overview("a", None);

        assert!(o.involves(&user::Id::from("jora")));
        assert!(o.involves(&user::Id::from("valera")));
        assert!(!o.involves(&user::Id::from("radu")));
        assert!(o.belongs_to(&conversation::Id::from("c1"), &user::Id::from("jora")));
        assert!(!o.belongs_to(&conversation::Id::from("c1"), &user::Id::from("valera")));
    }

    #[test]
    fn should_deserialize_without_last_message() {
        let json = r#"{
            "overviewId": "o1",
            "linkedConvId": "c1",
            "convName": "Chat",
            "ownerId": "jora",
            "otherPersonId": "valera"
        }"#;

        let o: Overview = serde_json::from_str(json).unwrap();

        assert_eq!(o.last_message, None);
        assert_eq!(o.unread_count, 0);
    }
}
