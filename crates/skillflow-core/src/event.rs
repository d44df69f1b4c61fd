//! Normalized events delivered to clients.

use serde::{Deserialize, Serialize};

/// Title used when a structured-question block does not carry one.
pub const DEFAULT_QUESTION_TITLE: &str = "Questions";

/// Event emitted while a skill executes.
///
/// Delivery per run is strictly ordered and append-only. Several `Text`
/// events may compose one logical assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SkillEvent {
    /// Visible assistant text.
    Text { text: String },
    /// A tool invocation by the runtime.
    Tool {
        name: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// A delegation to a sub-agent.
    Agent {
        id: String,
        subagent_type: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Token and cost counters reported at the end of a run.
    Usage(UsageReport),
    /// Step/phase outline and the currently active step.
    Progress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        steps: Option<Vec<StepInfo>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        active_step: Option<u32>,
    },
    /// Structured questions awaiting a human answer.
    Questions(QuestionSet),
    /// The runtime handed control to another skill.
    SkillChanged {
        new_skill_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_session_id: Option<String>,
        chain_input: String,
    },
    /// Terminal success event for an invocation.
    Complete {
        session_id: String,
        fully_complete: bool,
    },
    /// Terminal failure event for an invocation.
    Error { message: String },
    /// End-of-stream marker written by the transport.
    Done,
}

impl SkillEvent {
    /// Create a text event.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this event ends an invocation.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

/// Usage counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub total_cost_usd: f64,
    pub duration_ms: u64,
    pub num_turns: u32,
}

/// One entry of a skill's step outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
    pub step: u32,
    pub label: String,
}

/// Kind of answer a question expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    /// Free text.
    Text,
    /// Exactly one of `options`.
    Radio,
    /// Any subset of `options`.
    Checkbox,
}

/// A single structured question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionItem {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<QuestionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl QuestionItem {
    /// A free-text question with no extra metadata.
    #[must_use]
    pub fn text(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            description: None,
            suggestion: None,
            example: None,
            kind: Some(QuestionKind::Text),
            options: None,
        }
    }
}

/// A titled group of questions presented together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub title: String,
    pub questions: Vec<QuestionItem>,
}

impl QuestionSet {
    /// Append another set, keeping the newer title when it is non-empty.
    pub fn merge(&mut self, other: Self) {
        if !other.title.is_empty() {
            self.title = other.title;
        }
        self.questions.extend(other.questions);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_names() {
        let event = SkillEvent::SkillChanged {
            new_skill_name: "deploy".into(),
            new_session_id: None,
            chain_input: "now".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "skill_changed");
        assert_eq!(json["newSkillName"], "deploy");
        assert_eq!(json["chainInput"], "now");
        assert!(json.get("newSessionId").is_none());
    }

    #[test]
    fn test_usage_is_flattened_under_tag() {
        let event = SkillEvent::Usage(UsageReport {
            input_tokens: 10,
            num_turns: 2,
            ..UsageReport::default()
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "usage");
        assert_eq!(json["inputTokens"], 10);
        assert_eq!(json["numTurns"], 2);
    }

    #[test]
    fn test_question_type_field() {
        let item: QuestionItem =
            serde_json::from_str(r#"{"question":"Pick","type":"radio","options":["a","b"]}"#)
                .unwrap();
        assert_eq!(item.kind, Some(QuestionKind::Radio));
        assert_eq!(item.options.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
    }

    #[test]
    fn test_merge_keeps_last_non_empty_title() {
        let mut set = QuestionSet {
            title: "First".into(),
            questions: vec![QuestionItem::text("A")],
        };
        set.merge(QuestionSet {
            title: String::new(),
            questions: vec![QuestionItem::text("B")],
        });
        assert_eq!(set.title, "First");
        assert_eq!(set.questions.len(), 2);
    }

    #[test]
    fn test_terminal_events() {
        assert!(SkillEvent::error("boom").is_terminal());
        assert!(!SkillEvent::text("hi").is_terminal());
        assert!(!SkillEvent::Done.is_terminal());
    }
}
