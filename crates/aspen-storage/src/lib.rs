//! Aspen MDM Storage Layer
//!
//! The storage contract plus an in-memory backend, a Diesel/SQLite
//! backend with embedded migrations, and the multi-storage router.

mod inmem;
mod models;
mod multi;
mod schema;
mod sqlite;
mod traits;

pub use inmem::InMemoryStorage;
pub use models::*;
pub use multi::{MultiStorage, DEFAULT_STORAGE_PARAM};
pub use sqlite::SqliteStorage;
pub use traits::*;

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
