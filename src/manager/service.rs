use async_trait::async_trait;
use log::{debug, error, warn};

use crate::conversation::{self, model::Conversation};
use crate::message::{self, model::Message};
use crate::overview::{self, model::Overview};
use crate::user;

/// Keeps conversations and their per-participant overviews in step.
///
/// Every operation is a short sequence of repository calls. Nothing is
/// rolled back when a later step fails.
#[async_trait]
pub trait ConversationManager {
    fn new_message_id(&self) -> message::Id;

    async fn create_conversation_with_overviews(
        &self,
        creator_id: &user::Id,
        other_id: &user::Id,
        name: &str,
    ) -> super::Result<conversation::Id>;

    async fn delete_conversation_with_overviews(
        &self,
        conv_id: &conversation::Id,
    ) -> super::Result<()>;

    /// Removes the conversation for both sides and leaves the other
    /// participant a "Conversation deleted" marker in their overview.
    async fn leave_conversation(
        &self,
        conv_id: &conversation::Id,
        deleter_id: &user::Id,
        other_id: &user::Id,
    ) -> super::Result<()>;

    async fn send_message(&self, conv_id: &conversation::Id, msg: &Message) -> super::Result<()>;

    async fn reset_unread_count(
        &self,
        conv_id: &conversation::Id,
        user_id: &user::Id,
    ) -> super::Result<()>;

    async fn find_conversation(
        &self,
        conv_id: &conversation::Id,
    ) -> super::Result<Option<Conversation>>;

    async fn find_overviews(&self, user_id: &user::Id) -> super::Result<Vec<Overview>>;

    fn stream_messages(&self, conv_id: &conversation::Id) -> conversation::MessageStream;

    fn stream_overviews(&self, user_id: &user::Id) -> overview::OverviewStream;
}

#[derive(Clone)]
pub struct ConversationManagerImpl {
    conversation_repo: conversation::Repository,
    overview_repo: overview::Repository,
}

impl ConversationManagerImpl {
    pub fn new(
        conversation_repo: conversation::Repository,
        overview_repo: overview::Repository,
    ) -> Self {
        Self {
            conversation_repo,
            overview_repo,
        }
    }
}

#[async_trait]
impl ConversationManager for ConversationManagerImpl {
    fn new_message_id(&self) -> message::Id {
        message::Id::random()
    }

    async fn create_conversation_with_overviews(
        &self,
        creator_id: &user::Id,
        other_id: &user::Id,
        name: &str,
    ) -> super::Result<conversation::Id> {
        if creator_id == other_id {
            return Err(super::Error::SelfConversation(creator_id.clone()));
        }

        if let Some(existing) = self.live_conversation(creator_id, other_id).await? {
            debug!("conversation between {creator_id} and {other_id} already exists: {existing}");
            return Ok(existing);
        }
        // the other side may still hold a "Conversation deleted" marker for this pair
        self.live_conversation(other_id, creator_id).await?;

        let conv_id = self.conversation_repo.new_id();
        self.conversation_repo
            .create(&Conversation::new(conv_id.clone(), creator_id, other_id, name))
            .await?;

        self.overview_repo
            .upsert(&Overview::new(&conv_id, name, creator_id, other_id))
            .await?;
        self.overview_repo
            .upsert(&Overview::new(&conv_id, name, other_id, creator_id))
            .await?;

        debug!("conversation {conv_id} created by {creator_id} with {other_id}");
        Ok(conv_id)
    }

    async fn delete_conversation_with_overviews(
        &self,
        conv_id: &conversation::Id,
    ) -> super::Result<()> {
        self.conversation_repo.delete(conv_id).await?;
        self.overview_repo.delete_by_conversation(conv_id).await?;

        debug!("conversation {conv_id} deleted with its overviews");
        Ok(())
    }

    async fn leave_conversation(
        &self,
        conv_id: &conversation::Id,
        deleter_id: &user::Id,
        other_id: &user::Id,
    ) -> super::Result<()> {
        if self.conversation_repo.find_by_id(conv_id).await?.is_some() {
            self.conversation_repo.delete(conv_id).await?;
        }

        let own = self
            .overview_repo
            .list_for_user(deleter_id)
            .await?
            .into_iter()
            .filter(|o| o.belongs_to(conv_id, deleter_id));
        for o in own {
            self.overview_repo.delete_by_id(&o.overview_id).await?;
        }

        match self.find_own_overview(conv_id, other_id).await {
            Ok(Some(mut o)) => {
                o.last_message = Some(Message::conversation_deleted(other_id));
                o.unread_count = 0;
                if let Err(e) = self.overview_repo.upsert(&o).await {
                    error!("failed to mark overview {} as deleted: {e}", o.overview_id);
                }
            }
            Ok(None) => debug!("{other_id} has no overview for conversation {conv_id}"),
            Err(e) => error!("failed to look up overview of {other_id} for {conv_id}: {e}"),
        }

        debug!("{deleter_id} left conversation {conv_id}");
        Ok(())
    }

    async fn send_message(&self, conv_id: &conversation::Id, msg: &Message) -> super::Result<()> {
        self.conversation_repo.send_message(conv_id, msg).await?;

        match self.find_own_overview(conv_id, &msg.sender_id).await? {
            Some(mut o) => {
                o.last_message = Some(msg.clone());
                self.overview_repo.upsert(&o).await?;
            }
            None => warn!("sender {} has no overview for {conv_id}", msg.sender_id),
        }

        match self.find_own_overview(conv_id, &msg.receiver_id).await? {
            Some(mut o) => {
                o.last_message = Some(msg.clone());
                o.unread_count += 1;
                self.overview_repo.upsert(&o).await?;
            }
            None => warn!("receiver {} has no overview for {conv_id}", msg.receiver_id),
        }

        Ok(())
    }

    async fn reset_unread_count(
        &self,
        conv_id: &conversation::Id,
        user_id: &user::Id,
    ) -> super::Result<()> {
        if let Some(mut o) = self.find_own_overview(conv_id, user_id).await? {
            o.unread_count = 0;
            self.overview_repo.upsert(&o).await?;
        }
        Ok(())
    }

    async fn find_conversation(
        &self,
        conv_id: &conversation::Id,
    ) -> super::Result<Option<Conversation>> {
        let c = self.conversation_repo.find_by_id(conv_id).await?;
        Ok(c)
    }

    async fn find_overviews(&self, user_id: &user::Id) -> super::Result<Vec<Overview>> {
        let overviews = self.overview_repo.list_for_user(user_id).await?;
        Ok(overviews)
    }

    fn stream_messages(&self, conv_id: &conversation::Id) -> conversation::MessageStream {
        self.conversation_repo.stream_messages(conv_id)
    }

    fn stream_overviews(&self, user_id: &user::Id) -> overview::OverviewStream {
        self.overview_repo.stream_for_user(user_id)
    }
}

impl ConversationManagerImpl {
    /// Conversation behind an overview `owner_id` holds with `other_id`.
    /// Overviews left behind by a deleted conversation are removed on the way.
    async fn live_conversation(
        &self,
        owner_id: &user::Id,
        other_id: &user::Id,
    ) -> super::Result<Option<conversation::Id>> {
        let candidates = self
            .overview_repo
            .list_for_user(owner_id)
            .await?
            .into_iter()
            .filter(|o| &o.owner_id == owner_id && &o.other_person_id == other_id);

        for o in candidates {
            if self
                .conversation_repo
                .find_by_id(&o.linked_conv_id)
                .await?
                .is_some()
            {
                return Ok(Some(o.linked_conv_id));
            }
            debug!(
                "removing overview {} of deleted conversation {}",
                o.overview_id, o.linked_conv_id
            );
            self.overview_repo.delete_by_id(&o.overview_id).await?;
        }

        Ok(None)
    }

    async fn find_own_overview(
        &self,
        conv_id: &conversation::Id,
        user_id: &user::Id,
    ) -> super::Result<Option<Overview>> {
        let own = self
            .overview_repo
            .list_for_user(user_id)
            .await?
            .into_iter()
            .find(|o| o.belongs_to(conv_id, user_id));
        Ok(own)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use futures::StreamExt;

    use crate::conversation::repository::{ConversationRepository, MemoryConversationRepository};
    use crate::manager;
    use crate::overview::repository::MemoryOverviewRepository;

    use super::*;

    fn conv_manager() -> ConversationManagerImpl {
        ConversationManagerImpl::new(
            Arc::new(MemoryConversationRepository::default()),
            Arc::new(MemoryOverviewRepository::default()),
        )
    }

    fn users() -> (user::Id, user::Id) {
        (user::Id::from("u1"), user::Id::from("u2"))
    }

    async fn own(
        m: &ConversationManagerImpl,
        conv_id: &conversation::Id,
        user_id: &user::Id,
    ) -> Overview {
        m.find_own_overview(conv_id, user_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn should_create_conversation_with_mirrored_overviews() {
        let m = conv_manager();
        let (u1, u2) = users();

        let conv_id = m
            .create_conversation_with_overviews(&u1, &u2, "Chat")
            .await
            .unwrap();

        let conv = m.find_conversation(&conv_id).await.unwrap().unwrap();
        assert_eq!(conv.creator_id, u1);
        assert_eq!(conv.other_person_id, u2);
        assert_eq!(conv.display_name, "Chat");
        assert!(conv.messages.is_empty());

        let o1 = own(&m, &conv_id, &u1).await;
        let o2 = own(&m, &conv_id, &u2).await;
        assert_eq!(o1.other_person_id, u2);
        assert_eq!(o2.other_person_id, u1);
        assert_eq!(o1.linked_conv_id, conv_id);
        assert_eq!(o2.linked_conv_id, conv_id);
        assert_eq!(o1.unread_count, 0);
        assert_eq!(o2.last_message, None);
        assert_ne!(o1.overview_id, o2.overview_id);
    }

    #[tokio::test]
    async fn should_return_existing_conversation_for_same_pair() {
        let m = conv_manager();
        let (u1, u2) = users();

        let first = m
            .create_conversation_with_overviews(&u1, &u2, "Chat")
            .await
            .unwrap();
        let second = m
            .create_conversation_with_overviews(&u1, &u2, "Chat again")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(m.find_overviews(&u1).await.unwrap().len(), 2);
        assert_eq!(
            m.find_overviews(&u1)
                .await
                .unwrap()
                .iter()
                .filter(|o| o.owner_id == u1)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn should_start_new_conversation_after_other_left() {
        let m = conv_manager();
        let (u1, u2) = users();
        let first = m
            .create_conversation_with_overviews(&u1, &u2, "Chat")
            .await
            .unwrap();
        m.leave_conversation(&first, &u1, &u2).await.unwrap();

        let second = m
            .create_conversation_with_overviews(&u2, &u1, "Chat again")
            .await
            .unwrap();

        assert_ne!(first, second);
        assert!(m.find_conversation(&second).await.unwrap().is_some());
        let msg = Message::new(m.new_message_id(), &u2, &u1, "hi again");
        m.send_message(&second, &msg).await.unwrap();

        let overviews = m.find_overviews(&u2).await.unwrap();
        assert_eq!(overviews.len(), 2);
        assert!(overviews.iter().all(|o| o.linked_conv_id == second));
        assert_eq!(own(&m, &second, &u1).await.unread_count, 1);
    }

    #[tokio::test]
    async fn should_start_new_conversation_after_leaving() {
        let m = conv_manager();
        let (u1, u2) = users();
        let first = m
            .create_conversation_with_overviews(&u1, &u2, "Chat")
            .await
            .unwrap();
        m.leave_conversation(&first, &u1, &u2).await.unwrap();

        let second = m
            .create_conversation_with_overviews(&u1, &u2, "Chat again")
            .await
            .unwrap();

        assert_ne!(first, second);
        let overviews = m.find_overviews(&u2).await.unwrap();
        assert_eq!(overviews.len(), 2);
        assert!(overviews.iter().all(|o| o.linked_conv_id == second));
    }

    #[tokio::test]
    async fn should_reject_resent_message_without_touching_unread() {
        let m = conv_manager();
        let (u1, u2) = users();
        let conv_id = m
            .create_conversation_with_overviews(&u1, &u2, "Chat")
            .await
            .unwrap();
        let msg = Message::new(m.new_message_id(), &u1, &u2, "hi");
        m.send_message(&conv_id, &msg).await.unwrap();

        let res = m.send_message(&conv_id, &msg).await;

        assert!(matches!(
            res,
            Err(manager::Error::_Conversation(conversation::Error::DuplicateMessage(_)))
        ));
        assert_eq!(own(&m, &conv_id, &u2).await.unread_count, 1);
    }

    #[tokio::test]
    async fn should_reject_conversation_with_self() {
        let m = conv_manager();
        let (u1, _) = users();

        let res = m.create_conversation_with_overviews(&u1, &u1, "Me").await;

        assert!(matches!(res, Err(manager::Error::SelfConversation(id)) if id == u1));
    }

    #[tokio::test]
    async fn should_update_overviews_on_send() {
        let m = conv_manager();
        let (u1, u2) = users();
        let conv_id = m
            .create_conversation_with_overviews(&u1, &u2, "Chat")
            .await
            .unwrap();

        let msg = Message::new(m.new_message_id(), &u1, &u2, "hi");
        m.send_message(&conv_id, &msg).await.unwrap();

        let sender = own(&m, &conv_id, &u1).await;
        let receiver = own(&m, &conv_id, &u2).await;
        assert_eq!(sender.unread_count, 0);
        assert_eq!(receiver.unread_count, 1);
        assert_eq!(sender.last_message, Some(msg.clone()));
        assert_eq!(receiver.last_message, Some(msg));
    }

    #[tokio::test]
    async fn should_reset_only_own_unread_count() {
        let m = conv_manager();
        let (u1, u2) = users();
        let conv_id = m
            .create_conversation_with_overviews(&u1, &u2, "Chat")
            .await
            .unwrap();

        m.send_message(&conv_id, &Message::new(m.new_message_id(), &u1, &u2, "hi"))
            .await
            .unwrap();
        m.send_message(&conv_id, &Message::new(m.new_message_id(), &u2, &u1, "hey"))
            .await
            .unwrap();
        m.send_message(&conv_id, &Message::new(m.new_message_id(), &u1, &u2, "yo"))
            .await
            .unwrap();
        assert_eq!(own(&m, &conv_id, &u1).await.unread_count, 1);
        assert_eq!(own(&m, &conv_id, &u2).await.unread_count, 2);

        m.reset_unread_count(&conv_id, &u2).await.unwrap();

        assert_eq!(own(&m, &conv_id, &u2).await.unread_count, 0);
        assert_eq!(own(&m, &conv_id, &u1).await.unread_count, 1);
    }

    #[tokio::test]
    async fn should_ignore_reset_without_overview() {
        let m = conv_manager();

        let res = m
            .reset_unread_count(&conversation::Id::random(), &user::Id::from("u3"))
            .await;

        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn should_return_messages_in_send_order() {
        let m = conv_manager();
        let (u1, u2) = users();
        let conv_id = m
            .create_conversation_with_overviews(&u1, &u2, "Chat")
            .await
            .unwrap();

        let mut sent = Vec::new();
        for content in ["one", "two", "three", "four"] {
            let msg = Message::new(m.new_message_id(), &u1, &u2, content);
            m.send_message(&conv_id, &msg).await.unwrap();
            sent.push(msg);
        }

        let conv = m.find_conversation(&conv_id).await.unwrap().unwrap();
        assert_eq!(conv.messages, sent);
    }

    #[tokio::test]
    async fn should_skip_missing_overviews_on_send() {
        let conversations = Arc::new(MemoryConversationRepository::default());
        let m = ConversationManagerImpl::new(
            conversations.clone(),
            Arc::new(MemoryOverviewRepository::default()),
        );
        let (u1, u2) = users();
        let conv = Conversation::new(conversation::Id::random(), &u1, &u2, "Bare");
        conversations.create(&conv).await.unwrap();

        let msg = Message::new(m.new_message_id(), &u1, &u2, "hi");
        m.send_message(&conv.conv_id, &msg).await.unwrap();

        let stored = m.find_conversation(&conv.conv_id).await.unwrap().unwrap();
        assert_eq!(stored.messages, vec![msg]);
    }

    #[tokio::test]
    async fn should_fail_send_to_missing_conversation() {
        let m = conv_manager();
        let (u1, u2) = users();

        let res = m
            .send_message(
                &conversation::Id::random(),
                &Message::new(m.new_message_id(), &u1, &u2, "hi"),
            )
            .await;

        assert!(matches!(
            res,
            Err(manager::Error::_Conversation(conversation::Error::NotFound(_)))
        ));
        assert!(m.find_overviews(&u1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_delete_conversation_with_all_overviews() {
        let m = conv_manager();
        let (u1, u2) = users();
        let conv_id = m
            .create_conversation_with_overviews(&u1, &u2, "Chat")
            .await
            .unwrap();

        m.delete_conversation_with_overviews(&conv_id).await.unwrap();

        assert!(m.find_conversation(&conv_id).await.unwrap().is_none());
        assert!(m.find_overviews(&u1).await.unwrap().is_empty());
        assert!(m.find_overviews(&u2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_mark_other_overview_when_leaving() {
        let m = conv_manager();
        let (u1, u2) = users();
        let conv_id = m
            .create_conversation_with_overviews(&u1, &u2, "Chat")
            .await
            .unwrap();
        m.send_message(&conv_id, &Message::new(m.new_message_id(), &u1, &u2, "hi"))
            .await
            .unwrap();

        m.leave_conversation(&conv_id, &u1, &u2).await.unwrap();

        assert!(m.find_conversation(&conv_id).await.unwrap().is_none());
        assert!(m.find_own_overview(&conv_id, &u1).await.unwrap().is_none());

        let remaining = own(&m, &conv_id, &u2).await;
        assert_eq!(remaining.unread_count, 0);
        let marker = remaining.last_message.unwrap();
        assert!(marker.is_system());
        assert_eq!(marker.content, "Conversation deleted");
        assert_eq!(marker.receiver_id, u2);
    }

    #[tokio::test]
    async fn should_leave_already_deleted_conversation() {
        let m = conv_manager();
        let (u1, u2) = users();
        let conv_id = m
            .create_conversation_with_overviews(&u1, &u2, "Chat")
            .await
            .unwrap();

        m.leave_conversation(&conv_id, &u1, &u2).await.unwrap();
        m.leave_conversation(&conv_id, &u2, &u1).await.unwrap();

        assert!(m.find_overviews(&u1).await.unwrap().is_empty());
        assert!(m.find_overviews(&u2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_stream_through_repositories() {
        let m = conv_manager();
        let (u1, u2) = users();
        let conv_id = m
            .create_conversation_with_overviews(&u1, &u2, "Chat")
            .await
            .unwrap();

        let mut messages = m.stream_messages(&conv_id);
        let mut overviews = m.stream_overviews(&u2);
        assert!(messages.next().await.unwrap().unwrap().is_empty());
        assert!(messages.next().await.unwrap().unwrap().is_empty());
        assert_eq!(overviews.next().await.unwrap().unwrap().len(), 2);

        let msg = Message::new(m.new_message_id(), &u1, &u2, "hi");
        m.send_message(&conv_id, &msg).await.unwrap();

        assert_eq!(messages.next().await.unwrap().unwrap(), vec![msg]);
        let mut latest = overviews.next().await.unwrap().unwrap();
        // one emission per overview write, the receiver's update is the second
        if latest.iter().all(|o| o.unread_count == 0) {
            latest = overviews.next().await.unwrap().unwrap();
        }
        let receiver = latest.iter().find(|o| o.owner_id == u2).unwrap();
        assert_eq!(receiver.unread_count, 1);
    }
}
