//! CLI command implementations

pub mod cleanup;
pub mod import;
pub mod list;
pub mod operations;
pub mod serve;

pub use cleanup::CleanupArgs;
pub use import::ImportArgs;
pub use list::ListArgs;
pub use operations::OperationsArgs;
pub use serve::ServeArgs;
