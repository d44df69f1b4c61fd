//! Wire protocol for client-server communication.

use serde::{Deserialize, Serialize};
use skillflow_core::SkillEvent;
use skillflow_session::Session;

/// Body of a skill execution request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub input: Option<String>,
    /// Existing session to resume.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub plugin_id: Option<String>,
    /// Response language requested by the client.
    #[serde(default)]
    pub lang: Option<String>,
    /// Files the runtime should read.
    #[serde(default)]
    pub file_paths: Vec<String>,
}

impl ExecuteRequest {
    /// Input with surrounding whitespace removed, if any remains.
    #[must_use]
    pub fn trimmed_input(&self) -> Option<&str> {
        self.input.as_deref().map(str::trim).filter(|i| !i.is_empty())
    }
}

/// Body of a user response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RespondRequest {
    #[serde(default)]
    pub response: String,
}

/// Query of the session listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub plugin_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// JSON payload of one SSE frame.
///
/// Events are plain `data:` frames; the event kind travels in the `type`
/// field.
#[must_use]
pub fn encode_event(event: &SkillEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize event: {e}");
        r#"{"type":"error","message":"Failed to serialize event"}"#.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_request_defaults() {
        let req: ExecuteRequest = serde_json::from_str(r#"{"sessionId":"s1","lang":"en"}"#).unwrap();
        assert_eq!(req.session_id.as_deref(), Some("s1"));
        assert_eq!(req.lang.as_deref(), Some("en"));
        assert!(req.file_paths.is_empty());
        assert_eq!(req.trimmed_input(), None);

        let req: ExecuteRequest =
            serde_json::from_str(r#"{"input":"  go  ","filePaths":["a.md"]}"#).unwrap();
        assert_eq!(req.trimmed_input(), Some("go"));
        assert_eq!(req.file_paths, vec!["a.md"]);
    }

    #[test]
    fn test_encode_event() {
        assert_eq!(encode_event(&SkillEvent::Done), r#"{"type":"done"}"#);
        assert_eq!(
            encode_event(&SkillEvent::Complete {
                session_id: "s1".into(),
                fully_complete: true,
            }),
            r#"{"type":"complete","sessionId":"s1","fullyComplete":true}"#
        );
    }
}
