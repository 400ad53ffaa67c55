pub mod db;
pub mod engine;
pub mod filter;
pub mod ingest;
pub mod paginate;
pub mod ports;
pub mod query;
pub mod sort;
pub mod store;
pub mod types;

pub use engine::Engine;
pub use store::{MemoryStore, RecordStore};
pub use types::{ListParams, ListResponse, Pagination, SortKey, SortOrder};
