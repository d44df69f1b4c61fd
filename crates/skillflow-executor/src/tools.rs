//! Classification of runtime tool invocations.

use serde_json::Value;
use skillflow_core::{QuestionItem, QuestionKind, QuestionSet, SkillEvent};

/// Native tool that asks the user a structured question.
///
/// The runtime blocks waiting for its result, which this service never
/// supplies, so a call to it must end the run.
pub const ASK_USER_TOOL: &str = "AskUserQuestion";
/// Tool that delegates work to a sub-agent.
pub const DELEGATE_TOOL: &str = "Task";

const COMMAND_PREVIEW_CHARS: usize = 80;

/// What a tool invocation means to the translator.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    /// Unanswerable question tool; carries the synthesized questions.
    AskUser(Option<QuestionSet>),
    /// Sub-agent delegation.
    Delegate(SkillEvent),
    /// Any other tool.
    Other(SkillEvent),
}

/// Cost/capability class of a delegated sub-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Haiku,
    Sonnet,
    Opus,
}

impl ModelTier {
    /// Infer the tier from an agent name such as `scope:executor-low`.
    #[must_use]
    pub fn infer(subagent_type: &str) -> Self {
        let name = subagent_type.rsplit(':').next().unwrap_or_default();
        if name.ends_with("-low") {
            Self::Haiku
        } else if name.ends_with("-high") {
            Self::Opus
        } else {
            Self::Sonnet
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Haiku => "haiku",
            Self::Sonnet => "sonnet",
            Self::Opus => "opus",
        }
    }
}

/// Classify a tool invocation.
#[must_use]
pub fn classify(id: &str, name: &str, input: &Value) -> ToolCall {
    match name {
        ASK_USER_TOOL => ToolCall::AskUser(synthesize_questions(input)),
        DELEGATE_TOOL => ToolCall::Delegate(agent_event(id, input)),
        _ => ToolCall::Other(SkillEvent::Tool {
            name: name.to_string(),
            id: id.to_string(),
            description: describe(name, input),
        }),
    }
}

fn str_field<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

fn agent_event(id: &str, input: &Value) -> SkillEvent {
    let subagent_type = str_field(input, "subagent_type").unwrap_or("unknown");
    let model = str_field(input, "model")
        .filter(|m| !m.is_empty())
        .map_or_else(|| ModelTier::infer(subagent_type).as_str().to_string(), str::to_string);

    SkillEvent::Agent {
        id: id.to_string(),
        subagent_type: subagent_type.to_string(),
        model,
        description: str_field(input, "description").map(str::to_string),
    }
}

/// One-line description of a tool call from its primary argument.
#[must_use]
pub fn describe(name: &str, input: &Value) -> Option<String> {
    let desc = match name {
        "Bash" => str_field(input, "command")
            .map(|c| c.chars().take(COMMAND_PREVIEW_CHARS).collect::<String>()),
        "Read" | "Write" | "Edit" => str_field(input, "file_path").map(|p| basename(p).to_string()),
        "Grep" | "Glob" => str_field(input, "pattern").map(str::to_string),
        _ => None,
    };
    desc.filter(|d| !d.is_empty())
}

fn basename(path: &str) -> &str {
    path.rsplit(&['/', '\\'][..]).next().unwrap_or(path)
}

/// Convert the native question tool's input into a question set.
///
/// Returns `None` when the input has no usable questions.
#[must_use]
pub fn synthesize_questions(input: &Value) -> Option<QuestionSet> {
    let questions: Vec<QuestionItem> = input
        .get("questions")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(question_item)
        .collect();
    let first = questions.first()?.question.clone();
    let title = str_field(input, "title")
        .filter(|t| !t.is_empty())
        .map_or(first, str::to_string);

    Some(QuestionSet { title, questions })
}

/// Normalize one loosely shaped question.
///
/// Accepts a bare string or an object with a `question` field. Options may
/// be strings or objects with a `label`. An explicit `type` is kept when it
/// is one of the known kinds, otherwise the kind is inferred from the
/// options. Returns `None` when there is no question text.
pub(crate) fn question_item(raw: &Value) -> Option<QuestionItem> {
    let question = match raw {
        Value::String(s) => s.as_str(),
        other => str_field(other, "question")?,
    };
    if question.trim().is_empty() {
        return None;
    }

    let options: Vec<String> = raw
        .get("options")
        .and_then(Value::as_array)
        .map(|opts| {
            opts.iter()
                .filter_map(|o| match o {
                    Value::String(s) => Some(s.clone()),
                    other => str_field(other, "label").map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    let explicit = raw
        .get("type")
        .and_then(|t| serde_json::from_value::<QuestionKind>(t.clone()).ok());
    let kind = explicit.unwrap_or_else(|| {
        if options.is_empty() {
            QuestionKind::Text
        } else if raw.get("multiSelect").and_then(Value::as_bool) == Some(true) {
            QuestionKind::Checkbox
        } else {
            QuestionKind::Radio
        }
    });

    Some(QuestionItem {
        question: question.to_string(),
        description: str_field(raw, "description").map(str::to_string),
        suggestion: str_field(raw, "suggestion").map(str::to_string),
        example: str_field(raw, "example").map(str::to_string),
        kind: Some(kind),
        options: (!options.is_empty()).then_some(options),
    })
}
