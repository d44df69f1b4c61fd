//! Core types for streaming skill execution.
//!
//! This crate provides the fundamental building blocks:
//! - `SkillEvent` - Normalized events delivered to clients
//! - `RuntimeMessage` - Messages read from the agent runtime
//! - `ExecutionContext` - Ephemeral per-run state
//! - Provider traits for the runtime, agent registry and skill documents
//! - `Settings` - Service configuration

pub mod config;
pub mod context;
pub mod event;
pub mod message;
pub mod traits;

pub use config::Settings;
pub use context::{ExecutionContext, SkillChain};
pub use event::{QuestionItem, QuestionKind, QuestionSet, SkillEvent, StepInfo, UsageReport};
pub use message::{ContentBlock, ResultMessage, RuntimeMessage, TokenUsage};
pub use traits::{
    AgentDefinition, AgentRegistry, AgentRoster, AgentRuntime, DocumentError, EventSink,
    MessageStream, RunRequest, RuntimeError, SkillDocuments,
};
