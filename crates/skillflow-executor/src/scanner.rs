//! Scanner for control protocols embedded in assistant text.
//!
//! A text block is classified with fixed precedence, first match wins:
//! 1. a skill-chain directive (`/<plugin>:<skill> [args]` at line start),
//! 2. one or more structured-question regions,
//! 3. plain text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use skillflow_core::{QuestionSet, SkillChain, event::DEFAULT_QUESTION_TITLE};

use crate::tools::question_item;

/// Opening marker of a structured-question region.
pub const QUESTION_OPEN: &str = "<!--ASK_USER-->";
/// Closing marker of a structured-question region.
pub const QUESTION_CLOSE: &str = "<!--/ASK_USER-->";

static CHAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^/([A-Za-z0-9_-]+):([A-Za-z0-9_-]+)(?:[ \t]+([^\r\n]*))?[ \t]*\r?$").unwrap()
});

static QUESTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--ASK_USER-->\s*(.*?)\s*<!--/ASK_USER-->").unwrap()
});

/// Classification of one assistant text block.
#[derive(Debug, Clone, PartialEq)]
pub enum TextBlock {
    /// Hand control to another skill.
    Chain(SkillChain),
    /// Questions were found. `residual` is the text with every marker
    /// region removed; `questions` is `None` when no region parsed.
    Questions {
        residual: String,
        questions: Option<QuestionSet>,
    },
    /// Ordinary text, emitted verbatim.
    Plain(String),
}

/// Classify an assistant text block.
#[must_use]
pub fn scan(text: &str) -> TextBlock {
    if let Some(chain) = find_chain(text) {
        return TextBlock::Chain(chain);
    }
    if let Some(block) = extract_questions(text) {
        return block;
    }
    TextBlock::Plain(text.to_string())
}

/// Find the first skill-chain directive in `text`.
#[must_use]
pub fn find_chain(text: &str) -> Option<SkillChain> {
    let caps = CHAIN_PATTERN.captures(text)?;
    Some(SkillChain {
        plugin: caps[1].to_string(),
        skill_name: caps[2].to_string(),
        input: caps
            .get(3)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
    })
}

fn extract_questions(text: &str) -> Option<TextBlock> {
    let mut merged: Option<QuestionSet> = None;
    let mut regions = 0usize;

    for caps in QUESTION_PATTERN.captures_iter(text) {
        regions += 1;
        match serde_json::from_str::<Value>(&caps[1]) {
            Ok(region) => {
                let set = region_questions(&region);
                match &mut merged {
                    Some(existing) => existing.merge(set),
                    None => merged = Some(set),
                }
            }
            Err(e) => {
                tracing::warn!("Dropping malformed question block: {e}");
            }
        }
    }

    if regions == 0 {
        return None;
    }

    let questions = merged
        .filter(|set| !set.is_empty())
        .map(|mut set| {
            if set.title.is_empty() {
                set.title = DEFAULT_QUESTION_TITLE.to_string();
            }
            set
        });
    let residual = QUESTION_PATTERN.replace_all(text, "").trim().to_string();

    Some(TextBlock::Questions {
        residual,
        questions,
    })
}

/// Questions of one parsed region. Items without question text are skipped.
fn region_questions(region: &Value) -> QuestionSet {
    let questions = region
        .get("questions")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(question_item).collect())
        .unwrap_or_default();
    QuestionSet {
        title: region
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        questions,
    }
}
