//! SQLite backend for the payment store.
//!
//! The schema lives in `migrations/` and is applied by [`SqliteDatabase::migrate`].
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
