use std::env;
use std::fmt;

use redis::aio::{ConnectionManager, PubSub};
use redis::{RedisWrite, ToRedisArgs};

use crate::{conversation, overview, user};

#[derive(Clone)]
pub struct Config {
    host: String,
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 6379,
        }
    }
}

impl Config {
    pub fn env() -> super::Result<Self> {
        let host = env::var("REDIS_HOST")?;
        let port = env::var("REDIS_PORT")?.parse()?;
        Ok(Self { host, port })
    }
}

pub async fn init(config: &Config) -> super::Result<Redis> {
    let client = redis::Client::open(format!("redis://{}:{}", config.host, config.port))?;
    let con = client.get_connection_manager().await?;

    Ok(Redis { client, con })
}

/// Command connection plus the client used to open dedicated pub/sub connections.
#[derive(Clone)]
pub struct Redis {
    client: redis::Client,
    con: ConnectionManager,
}

impl Redis {
    pub fn con(&self) -> ConnectionManager {
        self.con.clone()
    }

    pub async fn subscribe(&self, channel: Channel<'_>) -> redis::RedisResult<PubSub> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        Ok(pubsub)
    }
}

pub enum Key<'a> {
    Conversation(&'a conversation::Id),
    Messages(&'a conversation::Id),
    MessageOrder(&'a conversation::Id),
    Overview(&'a overview::Id),
    UserOverviews(&'a user::Id),
    ConversationOverviews(&'a conversation::Id),
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Conversation(id) => write!(f, "conversations:{id}"),
            Key::Messages(id) => write!(f, "conversations:{id}:messages"),
            Key::MessageOrder(id) => write!(f, "conversations:{id}:messages:order"),
            Key::Overview(id) => write!(f, "overViewConv:{id}"),
            Key::UserOverviews(sub) => write!(f, "overViewConv:user:{sub}"),
            Key::ConversationOverviews(id) => write!(f, "overViewConv:conv:{id}"),
        }
    }
}

impl ToRedisArgs for Key<'_> {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.to_string().as_bytes())
    }
}

pub enum Channel<'a> {
    Messages(&'a conversation::Id),
    Overviews,
}

impl fmt::Display for Channel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Messages(id) => write!(f, "conversations:{id}:messages:changes"),
            Channel::Overviews => write!(f, "overViewConv:changes"),
        }
    }
}

impl ToRedisArgs for Channel<'_> {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.to_string().as_bytes())
    }
}
