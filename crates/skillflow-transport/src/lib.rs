//! Transport layer for skill execution.
//!
//! Provides:
//! - Wire protocol (JSON request bodies and SSE event frames)
//! - Per-session registry of in-flight executions
//! - HTTP transport (feature: http)

pub mod executions;
pub mod protocol;

#[cfg(feature = "http")]
pub mod http;

pub use executions::{ActiveExecutions, ExecutionHandle};
#[cfg(feature = "http")]
pub use http::{ApiError, AppState, create_router};
pub use protocol::{ExecuteRequest, RespondRequest, encode_event};
