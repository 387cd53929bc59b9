// Persistence infrastructure
pub mod database;        // Database interface, transactions and counter fields
pub mod sqlite_database; // SQLite implementation

pub use database::{Counter, CounterDrift, DatabaseInterface, DatabaseTransaction, PostQuery};
pub use sqlite_database::{ensure_parent_dir, SqliteDatabase};
