#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryRepository, LoginStampRepository, SessionContextRepository, Storage, StorageError,
    TopicCacheRepository,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
