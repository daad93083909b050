// Database module
// SQLite persistence for the durable vector index

pub mod sqlite;

pub use sqlite::*;
