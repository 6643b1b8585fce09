pub mod in_memory;
pub mod redis_store;

pub use in_memory::InMemoryKvStore;
pub use redis_store::RedisKvStore;
