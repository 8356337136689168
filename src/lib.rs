pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod observability;
pub mod query;
pub mod repo;

// Re-export main items
pub use config::Config;
pub use models::{Item, ItemDraft};
pub use query::{ListQuery, PagedResult, SortField};
