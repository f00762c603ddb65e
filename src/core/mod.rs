// Public modules
pub mod checkout;
pub mod config;
pub mod db;
pub mod deploy;
pub mod error;
pub mod hooks;
pub mod lifecycle;
pub mod paths;
pub mod pipeline;
pub mod release;
pub mod remote;
pub mod settings;
pub mod shared;
pub mod ssh;
pub mod tags;
pub mod tasks;

// Test support for this crate's unit and integration tests; not public API.
#[doc(hidden)]
pub mod testing;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
