//! Session store and skill execution orchestration.
//!
//! Provides:
//! - `SessionStore` - Session records with pending-response mailboxes
//! - `Orchestrator` - Drives one skill invocation end to end
//! - Storage implementations (memory, file)

pub mod mailbox;
pub mod orchestrator;
pub mod session;
pub mod storage;
pub mod store;

pub use mailbox::ResponseWaiter;
pub use orchestrator::{ExecutionOutcome, Orchestrator, OrchestratorConfig, SkillRequest};
pub use session::{
    Session, SessionError, SessionMeta, SessionStatus, SessionUsage, WaitError, preview_of,
};
pub use storage::{MemoryStorage, SessionStorage, StorageError};
#[cfg(feature = "file")]
pub use storage::FileStorage;
pub use store::SessionStore;
