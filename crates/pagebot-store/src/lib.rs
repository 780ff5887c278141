//! Storage layer: durable, content-addressed completion cache.

mod error;
pub use error::StoreError;

pub mod cache;
pub use cache::{
    CachedCompletion, CompletionCache, EvictionPolicy, FileCache, MaxAge, MemoryCache, NeverEvict,
};
