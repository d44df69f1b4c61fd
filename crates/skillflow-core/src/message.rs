//! Messages produced by the agent runtime during one conversational turn.
//!
//! The runtime emits tagged JSON objects. Only the fields the translator
//! relies on are modelled; unknown message and block types deserialize to
//! `Other` so that new runtime versions do not break decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message from the runtime's ordered output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeMessage {
    /// Session initialization.
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Assistant output: text and tool invocations.
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Tool results fed back to the model.
    User {
        #[serde(default)]
        message: Value,
    },
    /// End-of-turn statistics.
    Result(ResultMessage),
    #[serde(other)]
    Other,
}

impl RuntimeMessage {
    /// Assistant message consisting of a single text block.
    #[must_use]
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            message: AssistantMessage {
                content: vec![ContentBlock::Text { text: text.into() }],
            },
            session_id: None,
        }
    }

    /// Assistant message consisting of a single tool invocation.
    #[must_use]
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::Assistant {
            message: AssistantMessage {
                content: vec![ContentBlock::ToolUse {
                    id: id.into(),
                    name: name.into(),
                    input,
                }],
            },
            session_id: None,
        }
    }
}

/// Content of an assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// A block inside an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

/// Final statistics for a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub num_turns: Option<u32>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub is_error: bool,
}

/// Raw token counters as reported by the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_system_init() {
        let msg: RuntimeMessage = serde_json::from_str(
            r#"{"type":"system","subtype":"init","session_id":"abc","model":"x","tools":[]}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            RuntimeMessage::System {
                subtype: Some("init".into()),
                session_id: Some("abc".into()),
            }
        );
    }

    #[test]
    fn test_parse_assistant_blocks() {
        let msg: RuntimeMessage = serde_json::from_str(
            r#"{"type":"assistant","message":{"content":[
                {"type":"thinking","thinking":"..."},
                {"type":"text","text":"hi"},
                {"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}
            ]}}"#,
        )
        .unwrap();
        let RuntimeMessage::Assistant { message, .. } = msg else {
            panic!("expected assistant message");
        };
        assert_eq!(message.content[0], ContentBlock::Other);
        assert_eq!(message.content[1], ContentBlock::Text { text: "hi".into() });
        assert!(matches!(&message.content[2], ContentBlock::ToolUse { name, .. } if name == "Bash"));
    }

    #[test]
    fn test_parse_result() {
        let msg: RuntimeMessage = serde_json::from_str(
            r#"{"type":"result","subtype":"success","session_id":"s1","total_cost_usd":0.25,
                "num_turns":3,"duration_ms":1200,"is_error":false,
                "usage":{"input_tokens":100,"output_tokens":40,"cache_read_input_tokens":7}}"#,
        )
        .unwrap();
        let RuntimeMessage::Result(result) = msg else {
            panic!("expected result message");
        };
        assert_eq!(result.session_id.as_deref(), Some("s1"));
        assert_eq!(result.num_turns, Some(3));
        let usage = result.usage.unwrap();
        assert_eq!(usage.cache_read_input_tokens, 7);
        assert_eq!(usage.cache_creation_input_tokens, 0);
    }

    #[test]
    fn test_unknown_message_type() {
        let msg: RuntimeMessage =
            serde_json::from_str(r#"{"type":"stream_event","event":{}}"#).unwrap();
        assert_eq!(msg, RuntimeMessage::Other);
    }
}
