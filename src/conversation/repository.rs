use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use log::debug;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;

use crate::integration::cache::{self, Channel, Key};
use crate::message::model::Message;

use super::model::{Conversation, sort_by_creation};
use super::{BLANK_CONV_ID, BLANK_MSG_ID, Id, MessageStream};

const CHANGES_CAPACITY: usize = 64;

#[async_trait]
pub trait ConversationRepository {
    fn new_id(&self) -> Id;

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<Conversation>>;

    async fn create(&self, c: &Conversation) -> super::Result<()>;

    /// Removes the messages and the conversation document in one batch.
    async fn delete(&self, id: &Id) -> super::Result<()>;

    /// Stores the message, then touches `updated_at`. The two writes are not atomic.
    /// Messages are immutable, a second message with the same id is rejected.
    async fn send_message(&self, id: &Id, msg: &Message) -> super::Result<()>;

    /// Emits an empty list first, then the full ordered message list after every change.
    fn stream_messages(&self, id: &Id) -> MessageStream;
}

fn check_send(id: &Id, msg: &Message) -> super::Result<()> {
    if id.is_blank() {
        return Err(super::Error::InvalidArgument(BLANK_CONV_ID));
    }
    if msg.msg_id.is_blank() {
        return Err(super::Error::InvalidArgument(BLANK_MSG_ID));
    }
    Ok(())
}

pub struct RedisConversationRepository {
    redis: cache::Redis,
}

impl RedisConversationRepository {
    pub fn new(redis: cache::Redis) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl ConversationRepository for RedisConversationRepository {
    fn new_id(&self) -> Id {
        Id::random()
    }

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<Conversation>> {
        if id.is_blank() {
            return Ok(None);
        }

        let mut con = self.redis.con();
        let doc: Option<String> = con.get(Key::Conversation(id)).await?;

        match doc {
            Some(doc) => {
                let conv = serde_json::from_str::<Conversation>(&doc)?;
                let messages = load_messages(&mut con, id).await?;
                Ok(Some(conv.with_messages(messages)))
            }
            None => Ok(None),
        }
    }

    async fn create(&self, c: &Conversation) -> super::Result<()> {
        if c.conv_id.is_blank() {
            return Err(super::Error::InvalidArgument(BLANK_CONV_ID));
        }

        let doc = serde_json::to_string(&c.document())?;
        let mut con = self.redis.con();
        let _: () = con.set(Key::Conversation(&c.conv_id), doc).await?;

        Ok(())
    }

    async fn delete(&self, id: &Id) -> super::Result<()> {
        if id.is_blank() {
            return Err(super::Error::InvalidArgument(BLANK_CONV_ID));
        }

        let mut con = self.redis.con();
        let _: () = redis::pipe()
            .atomic()
            .del(Key::Messages(id))
            .ignore()
            .del(Key::MessageOrder(id))
            .ignore()
            .del(Key::Conversation(id))
            .ignore()
            .query_async(&mut con)
            .await?;

        let _: () = con.publish(Channel::Messages(id), id.as_str()).await?;

        Ok(())
    }

    async fn send_message(&self, id: &Id, msg: &Message) -> super::Result<()> {
        check_send(id, msg)?;

        let mut con = self.redis.con();
        let doc: Option<String> = con.get(Key::Conversation(id)).await?;
        let mut conv = match doc {
            Some(doc) => serde_json::from_str::<Conversation>(&doc)?,
            None => return Err(super::Error::NotFound(id.clone())),
        };

        let added: bool = con
            .hset_nx(
                Key::Messages(id),
                msg.msg_id.as_str(),
                serde_json::to_string(msg)?,
            )
            .await?;
        if !added {
            return Err(super::Error::DuplicateMessage(msg.msg_id.clone()));
        }
        let _: () = con.rpush(Key::MessageOrder(id), msg.msg_id.as_str()).await?;

        // XX: a conversation deleted in between is not brought back
        conv.updated_at = Some(msg.created_at);
        let _: () = redis::cmd("SET")
            .arg(Key::Conversation(id))
            .arg(serde_json::to_string(&conv)?)
            .arg("XX")
            .query_async(&mut con)
            .await?;

        let _: () = con
            .publish(Channel::Messages(id), msg.msg_id.as_str())
            .await?;

        debug!("message {} appended to conversation {id}", msg.msg_id);
        Ok(())
    }

    fn stream_messages(&self, id: &Id) -> MessageStream {
        Box::pin(redis_snapshots(self.redis.clone(), id.clone()))
    }
}

async fn load_messages(con: &mut ConnectionManager, id: &Id) -> super::Result<Vec<Message>> {
    let order: Vec<String> = con.lrange(Key::MessageOrder(id), 0, -1).await?;
    if order.is_empty() {
        return Ok(Vec::new());
    }

    let docs: Vec<Option<String>> = redis::cmd("HMGET")
        .arg(Key::Messages(id))
        .arg(&order)
        .query_async(con)
        .await?;

    let mut messages = docs
        .iter()
        .flatten()
        .map(|doc| serde_json::from_str::<Message>(doc))
        .collect::<Result<Vec<_>, _>>()?;
    sort_by_creation(&mut messages);

    Ok(messages)
}

fn redis_snapshots(
    redis: cache::Redis,
    id: Id,
) -> impl Stream<Item = super::Result<Vec<Message>>> {
    try_stream! {
        if id.is_blank() {
            Err::<(), _>(super::Error::InvalidArgument(BLANK_CONV_ID))?;
        }

        yield Vec::new();

        let pubsub = redis.subscribe(Channel::Messages(&id)).await?;
        let mut changes = pubsub.into_on_message();

        let mut con = redis.con();
        yield load_messages(&mut con, &id).await?;

        while changes.next().await.is_some() {
            yield load_messages(&mut con, &id).await?;
        }

        Err::<(), _>(super::Error::ListenerClosed)?;
    }
}

type Store = Arc<RwLock<HashMap<Id, Conversation>>>;

/// Keeps everything in process memory. Used by tests and `STORE=memory` runs.
pub struct MemoryConversationRepository {
    store: Store,
    changes: broadcast::Sender<Id>,
}

impl Default for MemoryConversationRepository {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGES_CAPACITY);
        Self {
            store: Arc::default(),
            changes,
        }
    }
}

impl MemoryConversationRepository {
    fn notify(&self, id: &Id) {
        // no receivers is fine
        let _ = self.changes.send(id.clone());
    }
}

#[async_trait]
impl ConversationRepository for MemoryConversationRepository {
    fn new_id(&self) -> Id {
        Id::random()
    }

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<Conversation>> {
        if id.is_blank() {
            return Ok(None);
        }

        let conv = self.store.read().await.get(id).cloned();

        Ok(conv.map(|mut c| {
            sort_by_creation(&mut c.messages);
            c
        }))
    }

    async fn create(&self, c: &Conversation) -> super::Result<()> {
        if c.conv_id.is_blank() {
            return Err(super::Error::InvalidArgument(BLANK_CONV_ID));
        }

        let mut store = self.store.write().await;
        let messages = store
            .remove(&c.conv_id)
            .map(|prev| prev.messages)
            .unwrap_or_default();
        store.insert(c.conv_id.clone(), c.document().with_messages(messages));

        Ok(())
    }

    async fn delete(&self, id: &Id) -> super::Result<()> {
        if id.is_blank() {
            return Err(super::Error::InvalidArgument(BLANK_CONV_ID));
        }

        self.store.write().await.remove(id);
        self.notify(id);

        Ok(())
    }

    async fn send_message(&self, id: &Id, msg: &Message) -> super::Result<()> {
        check_send(id, msg)?;

        {
            let mut store = self.store.write().await;
            let conv = store
                .get_mut(id)
                .ok_or_else(|| super::Error::NotFound(id.clone()))?;

            if conv.messages.iter().any(|m| m.msg_id == msg.msg_id) {
                return Err(super::Error::DuplicateMessage(msg.msg_id.clone()));
            }
            conv.messages.push(msg.clone());
            conv.updated_at = Some(msg.created_at);
        }

        self.notify(id);
        Ok(())
    }

    fn stream_messages(&self, id: &Id) -> MessageStream {
        Box::pin(memory_snapshots(
            self.store.clone(),
            self.changes.subscribe(),
            id.clone(),
        ))
    }
}

async fn snapshot(store: &Store, id: &Id) -> Vec<Message> {
    let mut messages = store
        .read()
        .await
        .get(id)
        .map(|c| c.messages.clone())
        .unwrap_or_default();
    sort_by_creation(&mut messages);
    messages
}

fn memory_snapshots(
    store: Store,
    mut changes: broadcast::Receiver<Id>,
    id: Id,
) -> impl Stream<Item = super::Result<Vec<Message>>> {
    try_stream! {
        if id.is_blank() {
            Err::<(), _>(super::Error::InvalidArgument(BLANK_CONV_ID))?;
        }

        yield Vec::new();
        yield snapshot(&store, &id).await;

        loop {
            match changes.recv().await {
                Ok(changed) if changed != id => continue,
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    yield snapshot(&store, &id).await;
                }
                Err(RecvError::Closed) => break,
            }
        }

        Err::<(), _>(super::Error::ListenerClosed)?;
    }
}
