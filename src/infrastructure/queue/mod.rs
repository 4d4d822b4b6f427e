mod channel;
mod redis_queue;

pub use channel::ChannelQueue;
pub use redis_queue::{create_pool, queues, QueueError, RedisPool, RedisQueue};
