//! Translation caches: the in-process two-layer cache and the optional
//! cross-process distributed cache.

mod distributed;
mod memory;

pub use distributed::{cache_key, DistributedCache, InMemoryDistributedCache};
pub use memory::{source_hash, MemoryCache, PreloadedEntry, DEFAULT_RUNTIME_TTL};
