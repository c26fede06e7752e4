pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod middleware;
pub mod quotes;
pub mod response;
pub mod server;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use limiter::{Decision, Quota, QuotaPolicy, SlidingWindowLimiter};
pub use server::{create_app, AppState, Server};
pub use store::{CounterStore, MemoryStore, ValkeyStore};
