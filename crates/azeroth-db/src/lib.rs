pub mod catalog_cache;
pub mod db;
pub mod game_paths;
pub mod migrations;

// Re-export commonly used items
pub use catalog_cache::{CachedCatalog, CatalogCache};
pub use db::Database;
pub use game_paths::SqlitePathStore;
