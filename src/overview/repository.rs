use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use log::debug;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::conversation;
use crate::integration::cache::{self, Channel, Key};
use crate::user;

use super::model::{Overview, sort_by_recent_activity};
use super::{BLANK_USER_ID, Id, OverviewStream};

const CHANGES_CAPACITY: usize = 64;

#[async_trait]
pub trait OverviewRepository {
    fn new_id(&self) -> Id;

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<Overview>>;

    /// Overviews where the user is either the owner or the other participant,
    /// most recently active first.
    async fn list_for_user(&self, user_id: &user::Id) -> super::Result<Vec<Overview>>;

    /// Stores the whole record, replacing any previous version. Returns the stored id.
    async fn upsert(&self, o: &Overview) -> super::Result<Id>;

    async fn delete_by_conversation(&self, conv_id: &conversation::Id) -> super::Result<()>;

    async fn delete_by_id(&self, id: &Id) -> super::Result<()>;

    fn stream_for_user(&self, user_id: &user::Id) -> OverviewStream;
}

fn check_user(user_id: &user::Id) -> super::Result<()> {
    if user_id.is_blank() {
        return Err(super::Error::InvalidArgument(BLANK_USER_ID));
    }
    Ok(())
}

fn assign_id(o: &Overview) -> Overview {
    if o.overview_id.is_blank() {
        o.clone().with_id(Id::random())
    } else {
        o.clone()
    }
}

pub struct RedisOverviewRepository {
    redis: cache::Redis,
}

impl RedisOverviewRepository {
    pub fn new(redis: cache::Redis) -> Self {
        Self { redis }
    }
}

async fn get(con: &mut ConnectionManager, id: &Id) -> super::Result<Option<Overview>> {
    let doc: Option<String> = con.get(Key::Overview(id)).await?;
    match doc {
        Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
        None => Ok(None),
    }
}

fn unindex(pipe: &mut redis::Pipeline, o: &Overview) {
    let id = o.overview_id.as_str();
    pipe.srem(Key::UserOverviews(&o.owner_id), id)
        .ignore()
        .srem(Key::UserOverviews(&o.other_person_id), id)
        .ignore()
        .srem(Key::ConversationOverviews(&o.linked_conv_id), id)
        .ignore();
}

async fn query_for_user(
    con: &mut ConnectionManager,
    user_id: &user::Id,
) -> super::Result<Vec<Overview>> {
    check_user(user_id)?;

    let ids: Vec<String> = con.smembers(Key::UserOverviews(user_id)).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let keys = ids
        .iter()
        .map(|id| Key::Overview(&Id::from(id.as_str())).to_string())
        .collect::<Vec<_>>();
    let docs: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(con).await?;

    let mut overviews = docs
        .iter()
        .flatten()
        .map(|doc| serde_json::from_str::<Overview>(doc))
        .collect::<Result<Vec<_>, _>>()?;
    sort_by_recent_activity(&mut overviews);

    Ok(overviews)
}

#[async_trait]
impl OverviewRepository for RedisOverviewRepository {
    fn new_id(&self) -> Id {
        Id::random()
    }

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<Overview>> {
        if id.is_blank() {
            return Ok(None);
        }
        get(&mut self.redis.con(), id).await
    }

    async fn list_for_user(&self, user_id: &user::Id) -> super::Result<Vec<Overview>> {
        query_for_user(&mut self.redis.con(), user_id).await
    }

    async fn upsert(&self, o: &Overview) -> super::Result<Id> {
        let o = assign_id(o);
        let mut con = self.redis.con();
        let previous = get(&mut con, &o.overview_id).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(previous) = previous.as_ref() {
            unindex(&mut pipe, previous);
        }
        pipe.set(Key::Overview(&o.overview_id), serde_json::to_string(&o)?)
            .ignore()
            .sadd(Key::UserOverviews(&o.owner_id), o.overview_id.as_str())
            .ignore()
            .sadd(Key::UserOverviews(&o.other_person_id), o.overview_id.as_str())
            .ignore()
            .sadd(
                Key::ConversationOverviews(&o.linked_conv_id),
                o.overview_id.as_str(),
            )
            .ignore()
            .publish(Channel::Overviews, o.overview_id.as_str())
            .ignore();
        let _: () = pipe.query_async(&mut con).await?;

        debug!("overview {} stored for {}", o.overview_id, o.owner_id);
        Ok(o.overview_id)
    }

    async fn delete_by_conversation(&self, conv_id: &conversation::Id) -> super::Result<()> {
        if conv_id.is_blank() {
            return Ok(());
        }

        let mut con = self.redis.con();
        let ids: Vec<String> = con.smembers(Key::ConversationOverviews(conv_id)).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for id in ids.iter().map(|id| Id::from(id.as_str())) {
            if let Some(o) = get(&mut con, &id).await? {
                unindex(&mut pipe, &o);
            }
            pipe.del(Key::Overview(&id)).ignore();
        }
        pipe.del(Key::ConversationOverviews(conv_id))
            .ignore()
            .publish(Channel::Overviews, conv_id.as_str())
            .ignore();
        let _: () = pipe.query_async(&mut con).await?;

        debug!("{} overview(s) of conversation {conv_id} deleted", ids.len());
        Ok(())
    }

    async fn delete_by_id(&self, id: &Id) -> super::Result<()> {
        if id.is_blank() {
            return Ok(());
        }

        let mut con = self.redis.con();
        let Some(o) = get(&mut con, id).await? else {
            return Ok(());
        };

        let mut pipe = redis::pipe();
        pipe.atomic();
        unindex(&mut pipe, &o);
        pipe.del(Key::Overview(id))
            .ignore()
            .publish(Channel::Overviews, id.as_str())
            .ignore();
        let _: () = pipe.query_async(&mut con).await?;

        Ok(())
    }

    fn stream_for_user(&self, user_id: &user::Id) -> OverviewStream {
        Box::pin(redis_snapshots(self.redis.clone(), user_id.clone()))
    }
}

fn redis_snapshots(
    redis: cache::Redis,
    user_id: user::Id,
) -> impl Stream<Item = super::Result<Vec<Overview>>> {
    try_stream! {
        check_user(&user_id)?;

        let pubsub = redis.subscribe(Channel::Overviews).await?;
        let mut changes = pubsub.into_on_message();

        let mut con = redis.con();
        yield query_for_user(&mut con, &user_id).await?;

        while changes.next().await.is_some() {
            yield query_for_user(&mut con, &user_id).await?;
        }

        Err::<(), _>(super::Error::ListenerClosed)?;
    }
}

type Store = Arc<RwLock<HashMap<Id, Overview>>>;

pub struct MemoryOverviewRepository {
    store: Store,
    changes: broadcast::Sender<()>,
}

impl Default for MemoryOverviewRepository {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGES_CAPACITY);
        Self {
            store: Arc::default(),
            changes,
        }
    }
}

impl MemoryOverviewRepository {
    fn notify(&self) {
        let _ = self.changes.send(());
    }
}

async fn snapshot(store: &Store, user_id: &user::Id) -> super::Result<Vec<Overview>> {
    check_user(user_id)?;

    let mut overviews = store
        .read()
        .await
        .values()
        .filter(|o| o.involves(user_id))
        .cloned()
        .collect::<Vec<_>>();
    sort_by_recent_activity(&mut overviews);

    Ok(overviews)
}

#[async_trait]
impl OverviewRepository for MemoryOverviewRepository {
    fn new_id(&self) -> Id {
        Id::random()
    }

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<Overview>> {
        Ok(self.store.read().await.get(id).cloned())
    }

    async fn list_for_user(&self, user_id: &user::Id) -> super::Result<Vec<Overview>> {
        snapshot(&self.store, user_id).await
    }

    async fn upsert(&self, o: &Overview) -> super::Result<Id> {
        let o = assign_id(o);
        let id = o.overview_id.clone();

        self.store.write().await.insert(id.clone(), o);
        self.notify();

        Ok(id)
    }

    async fn delete_by_conversation(&self, conv_id: &conversation::Id) -> super::Result<()> {
        if conv_id.is_blank() {
            return Ok(());
        }

        self.store
            .write()
            .await
            .retain(|_, o| &o.linked_conv_id != conv_id);
        self.notify();

        Ok(())
    }

    async fn delete_by_id(&self, id: &Id) -> super::Result<()> {
        if self.store.write().await.remove(id).is_some() {
            self.notify();
        }

        Ok(())
    }

    fn stream_for_user(&self, user_id: &user::Id) -> OverviewStream {
        Box::pin(memory_snapshots(
            self.store.clone(),
            self.changes.subscribe(),
            user_id.clone(),
        ))
    }
}

fn memory_snapshots(
    store: Store,
    mut changes: broadcast::Receiver<()>,
    user_id: user::Id,
) -> impl Stream<Item = super::Result<Vec<Overview>>> {
    try_stream! {
        yield snapshot(&store, &user_id).await?;

        loop {
            match changes.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    yield snapshot(&store, &user_id).await?;
                }
                Err(RecvError::Closed) => break,
            }
        }

        Err::<(), _>(super::Error::ListenerClosed)?;
    }
}
