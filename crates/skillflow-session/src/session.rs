//! Session records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skillflow_core::UsageReport;
use thiserror::Error;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Waiting,
    Completed,
    Error,
}

/// Usage of the most recent invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost_usd: f64,
    pub duration_ms: u64,
}

impl From<&UsageReport> for SessionUsage {
    fn from(report: &UsageReport) -> Self {
        Self {
            input_tokens: report.input_tokens,
            output_tokens: report.output_tokens,
            total_cost_usd: report.total_cost_usd,
            duration_ms: report.duration_ms,
        }
    }
}

/// Durable record of one skill engagement.
///
/// This is exactly what is persisted; the pending-response slot lives
/// beside it in the store and never reaches disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub skill_name: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Runtime transcript id used to resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_icon: Option<String>,
    /// Skill that chained into this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_skill_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<SessionUsage>,
}

impl Session {
    #[must_use]
    pub fn new(id: String, skill_name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            skill_name,
            status: SessionStatus::Active,
            created_at: now,
            last_activity: now,
            sdk_session_id: None,
            preview: None,
            plugin_id: None,
            skill_icon: None,
            previous_skill_name: None,
            usage: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

/// Characters of input kept as a session preview.
pub const PREVIEW_CHARS: usize = 100;

/// Session preview for `text`.
#[must_use]
pub fn preview_of(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Partial metadata update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMeta {
    pub preview: Option<String>,
    pub plugin_id: Option<String>,
    pub skill_icon: Option<String>,
    pub previous_skill_name: Option<String>,
    pub usage: Option<SessionUsage>,
}

impl SessionMeta {
    pub(crate) fn apply(self, session: &mut Session) {
        if let Some(preview) = self.preview {
            session.preview = Some(preview);
        }
        if let Some(plugin_id) = self.plugin_id {
            session.plugin_id = Some(plugin_id);
        }
        if let Some(icon) = self.skill_icon {
            session.skill_icon = Some(icon);
        }
        if let Some(previous) = self.previous_skill_name {
            session.previous_skill_name = Some(previous);
        }
        if let Some(usage) = self.usage {
            session.usage = Some(usage);
        }
    }
}

/// Session store error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(String),
}

/// Why a pending wait for a user response ended without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("Session deleted")]
    Deleted,
    #[error("Session timed out")]
    TimedOut,
    #[error("Wait superseded by a newer wait")]
    Superseded,
    #[error("Session store closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let mut session = Session::new("s1".into(), "deploy".into());
        session.plugin_id = Some("dmap".into());
        session.usage = Some(SessionUsage {
            input_tokens: 1,
            output_tokens: 2,
            total_cost_usd: 0.5,
            duration_ms: 10,
        });

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["skillName"], "deploy");
        assert_eq!(json["status"], "active");
        assert_eq!(json["pluginId"], "dmap");
        assert_eq!(json["usage"]["totalCostUsd"], 0.5);
        assert!(json.get("sdkSessionId").is_none());

        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_meta_applies_only_given_fields() {
        let mut session = Session::new("s1".into(), "deploy".into());
        session.preview = Some("old".into());
        SessionMeta {
            plugin_id: Some("dmap".into()),
            ..SessionMeta::default()
        }
        .apply(&mut session);
        assert_eq!(session.preview.as_deref(), Some("old"));
        assert_eq!(session.plugin_id.as_deref(), Some("dmap"));
    }

    #[test]
    fn test_preview_counts_chars() {
        let long = "가".repeat(150);
        assert_eq!(preview_of(&long).chars().count(), PREVIEW_CHARS);
        assert_eq!(preview_of("short"), "short");
    }
}
