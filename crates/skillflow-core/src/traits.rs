//! Traits for the collaborators a skill execution depends on.

use std::{collections::BTreeMap, path::PathBuf};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{RuntimeMessage, SkillEvent};

/// Sub-agent definition forwarded to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub description: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disallowed_tools: Option<Vec<String>>,
}

/// Agents keyed by fully-qualified name.
///
/// Ordered so that the serialized roster, and the prompt text derived from
/// it, is identical across invocations.
pub type AgentRoster = BTreeMap<String, AgentDefinition>;

/// Source of sub-agent definitions.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Agents available to every skill.
    async fn orchestration_agents(&self) -> AgentRoster;

    /// Agents registered by a plugin.
    async fn plugin_agents(&self, plugin_id: &str, skill_name: Option<&str>) -> AgentRoster;
}

/// Skill document lookup error.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Skill \"{skill}\" not found")]
    NotFound { skill: String },
    #[error("Failed to read skill \"{skill}\": {source}")]
    Io {
        skill: String,
        #[source]
        source: std::io::Error,
    },
}

/// Source of skill instruction documents.
#[async_trait]
pub trait SkillDocuments: Send + Sync {
    /// Read the raw instruction text of `skill_name` for a project.
    async fn load(&self, skill_name: &str, project_dir: &std::path::Path)
    -> Result<String, DocumentError>;
}

/// Runtime error.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to start runtime: {0}")]
    Start(String),
    #[error("Runtime stream failed: {0}")]
    Stream(String),
    #[error("Runtime exited with {code:?}: {stderr}")]
    Exited { code: Option<i32>, stderr: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered output of one runtime run.
pub type MessageStream = BoxStream<'static, Result<RuntimeMessage, RuntimeError>>;

/// Parameters for one runtime run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// User-turn prompt.
    pub prompt: String,
    /// Text appended to the runtime's own system prompt.
    pub system_prompt: String,
    /// Working directory for tools.
    pub working_dir: PathBuf,
    /// Runtime session to resume.
    pub resume: Option<String>,
    /// Sub-agents; `None` when the roster is empty.
    pub agents: Option<AgentRoster>,
    /// Cancelling this token aborts the run.
    pub cancel: CancellationToken,
}

/// An abortable, optionally resumable agent runtime.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Start a run and return its message stream.
    async fn start(&self, request: RunRequest) -> Result<MessageStream, RuntimeError>;
}

/// Receiver of normalized events and out-of-band run signals.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver an event.
    async fn emit(&self, event: SkillEvent);

    /// A new runtime session id was observed.
    async fn session_id(&self, _sdk_session_id: &str) {}

    /// Visible text was produced.
    async fn text_produced(&self) {}
}

#[async_trait]
impl EventSink for mpsc::UnboundedSender<SkillEvent> {
    async fn emit(&self, event: SkillEvent) {
        // Receiver gone means the client disconnected; cancellation follows.
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_definition_wire_format() {
        let def: AgentDefinition = serde_json::from_str(
            r#"{"description":"d","prompt":"p","model":"opus","disallowedTools":["Write"]}"#,
        )
        .unwrap();
        assert_eq!(def.model.as_deref(), Some("opus"));
        assert_eq!(def.disallowed_tools, Some(vec!["Write".to_string()]));

        let json = serde_json::to_value(AgentDefinition {
            description: "d".into(),
            prompt: "p".into(),
            model: None,
            disallowed_tools: None,
        })
        .unwrap();
        assert!(json.get("model").is_none());
    }

    #[test]
    fn test_unbounded_sender_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio_test::block_on(tx.emit(SkillEvent::text("hello")));
        assert_eq!(rx.try_recv().unwrap(), SkillEvent::text("hello"));

        drop(rx);
        // Emitting into a closed channel is silently ignored.
        tokio_test::block_on(tx.emit(SkillEvent::Done));
    }

    #[test]
    fn test_not_found_message() {
        let err = DocumentError::NotFound {
            skill: "deploy".into(),
        };
        assert_eq!(err.to_string(), "Skill \"deploy\" not found");
    }
}
