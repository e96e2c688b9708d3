#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    IdentityProvider, InMemoryRepository, KeyValueStore, PersistenceKey, StaticIdentity, Storage,
    StorageError,
};
