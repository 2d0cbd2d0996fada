mod articles;
mod memory;
mod schema;
mod store;
mod types;

pub use memory::MemoryStore;
pub use schema::Database;
pub use store::ArticleStore;
pub use types::{ArticlePayload, ArticleRecord, StorageError};
