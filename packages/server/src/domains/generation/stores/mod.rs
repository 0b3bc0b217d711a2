//! Storage for runs and posts, in memory or in PostgreSQL.

mod post_store;
mod run_store;

pub use post_store::{MemoryPostStore, PostStore, PostgresPostStore};
pub use run_store::{MemoryRunStore, PostgresRunStore, RunStore};
