pub mod config;
pub mod error;
pub mod file;
pub mod metric;
pub mod pod;
pub mod queue;
pub mod state;
pub mod store;
pub mod time;

pub use config::Config;
pub use error::*;
pub use file::*;
pub use metric::*;
pub use pod::*;
pub use queue::*;
pub use state::*;
pub use store::{lock_queue, ClearedCounts, SharedTaskQueue, Store, StoreError, StoreSnapshot};
pub use time::*;
