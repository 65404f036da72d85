mod pool;

pub use pool::{PoolError, RedisPool};
