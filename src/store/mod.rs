pub mod cache;
pub mod sessions;

pub use cache::CacheStore;
pub use sessions::SessionDirectory;
