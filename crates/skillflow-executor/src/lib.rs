//! Skill execution building blocks.
//!
//! Provides:
//! - The stream translator and the text/tool scanners it relies on
//! - System and user prompt assembly
//! - Step outline parsing for progress reporting
//! - Filesystem providers for skill documents and agent rosters
//! - The Claude CLI runtime

pub mod claude;
pub mod command;
pub mod documents;
pub mod prompt;
pub mod registry;
pub mod resolve;
pub mod scanner;
pub mod steps;
pub mod tools;
pub mod translator;

pub use claude::{ClaudeCli, CliOptions, PermissionMode};
pub use command::{CommandBuildError, CommandBuilder, CommandParts};
pub use documents::FsSkillDocuments;
pub use prompt::{FREE_PROMPT_SKILL, PromptMode, SystemPromptBuilder, UserPromptBuilder};
pub use registry::{FileAgentRegistry, merge_rosters};
pub use scanner::TextBlock;
pub use steps::{ProgressTracker, SkillOutline};
pub use translator::StreamTranslator;
