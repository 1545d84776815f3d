//! Storage module for persistent data storage
//!
//! SQLite-backed users, documents, chunks and conversations.

mod database;

pub use database::Database;
