//! Claude CLI runtime adapter.

pub mod client;
pub mod types;

pub use client::ClaudeCli;
pub use types::{CliOptions, PermissionMode};
