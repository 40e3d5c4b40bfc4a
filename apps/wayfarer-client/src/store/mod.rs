pub mod kv;
pub mod token;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use token::TokenStore;
