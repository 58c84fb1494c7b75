//! Repository modules for database operations

pub mod kv;
pub mod operations;

pub use kv::SqliteStore;
pub use operations::OperationsRepo;
