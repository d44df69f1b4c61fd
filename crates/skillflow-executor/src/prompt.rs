//! System-prompt addendum and user prompt assembly.
//!
//! Sections of the system prompt are always emitted in the same order so the
//! runtime can reuse its prompt-prefix cache across runs of one skill.

use std::fmt::Write as _;

use skillflow_core::AgentRoster;

use crate::scanner::{QUESTION_CLOSE, QUESTION_OPEN};

/// Skill name that selects free-form prompt mode.
pub const FREE_PROMPT_SKILL: &str = "__prompt__";

/// Whether a run executes a skill document or a free-form request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Skill,
    FreeForm,
}

impl PromptMode {
    #[must_use]
    pub fn for_skill(skill_name: &str) -> Self {
        if skill_name == FREE_PROMPT_SKILL {
            Self::FreeForm
        } else {
            Self::Skill
        }
    }
}

const EXECUTOR_ROLE: &str = "IMPORTANT: You are a skill executor. Execute the skill instructions \
below using the available tools (Read, Write, Edit, Bash, Glob, Grep, WebFetch, WebSearch, Task). \
Do NOT invoke other skills. Do NOT enter plan mode. Do NOT use TodoWrite.";

const ASSISTANT_ROLE: &str = "You are a helpful assistant working in the project directory. \
Carry out the user's request using the available tools (Read, Write, Edit, Bash, Glob, Grep, \
WebFetch, WebSearch, Task). Do NOT invoke other skills. Do NOT enter plan mode. \
Do NOT use TodoWrite.";

const DELEGATION_GUIDANCE: &str = "AGENT DELEGATION: You MAY use the Task tool for parallel or \
complex work. Set the model parameter to \"haiku\", \"sonnet\" or \"opus\" to choose a tier.";

const SKILL_INSTRUCTIONS_HEADER: &str = "=== SKILL INSTRUCTIONS ===";

fn question_instructions() -> String {
    format!(
        "USER INTERACTION FORMAT:
The AskUserQuestion tool is not available in this environment. When you need input from the \
user, output a single block in exactly this form:
{QUESTION_OPEN}
{{\"title\":\"Section title\",\"questions\":[
  {{\"question\":\"Free text question\",\"description\":\"Details\",\"type\":\"text\",\"suggestion\":\"Default\",\"example\":\"Placeholder\"}},
  {{\"question\":\"Pick one\",\"type\":\"radio\",\"options\":[\"A\",\"B\"]}},
  {{\"question\":\"Pick any\",\"type\":\"checkbox\",\"options\":[\"X\",\"Y\"]}}
]}}
{QUESTION_CLOSE}
Rules:
- Put ALL questions in ONE block. Never ask questions as plain text.
- Use \"text\" only when the answer cannot be enumerated; prefer \"radio\" or \"checkbox\".
- Do NOT add an \"other\" option. The UI provides a custom input field.
- Write any explanation before the block."
    )
}

fn chain_convention(plugin_id: Option<&str>) -> String {
    let plugin = plugin_id.unwrap_or("plugin");
    format!(
        "SKILL CHAIN CONVENTION:
When your work is complete and another skill should continue the workflow:
1. Save the key results the next skill needs to ./output/{{current-skill-name}}-result.md using the Write tool.
2. Then output the chain command alone on its own line: /{plugin}:<skill-name> [optional input]
Only output a line starting with /{plugin}: when you intend to hand control to that skill."
    )
}

/// Inputs for the system-prompt addendum.
#[derive(Debug, Clone, Copy)]
pub struct SystemPromptBuilder<'a> {
    pub mode: PromptMode,
    /// Language to answer in when it differs from the document language.
    pub override_language: Option<&'a str>,
    pub roster: &'a AgentRoster,
    pub plugin_id: Option<&'a str>,
    pub previous_skill: Option<&'a str>,
    /// Skill document, appended after the fixed sections.
    pub document: Option<&'a str>,
}

impl SystemPromptBuilder<'_> {
    /// Render the addendum.
    #[must_use]
    pub fn build(&self) -> String {
        let mut sections: Vec<String> = Vec::with_capacity(8);

        if let Some(language) = self.override_language.map(language_name) {
            sections.push(format!(
                "### LANGUAGE OVERRIDE (HIGHEST PRIORITY) ###\n\
                 You MUST respond ONLY in {language}. Every message, explanation, question and \
                 status update MUST be written in {language}, even if the instructions below are \
                 written in another language.\n\
                 ### END LANGUAGE OVERRIDE ###"
            ));
        }

        sections.push(
            match self.mode {
                PromptMode::Skill => EXECUTOR_ROLE,
                PromptMode::FreeForm => ASSISTANT_ROLE,
            }
            .to_string(),
        );

        sections.push(self.delegation_guidance());
        sections.push(question_instructions());

        if self.mode == PromptMode::Skill {
            sections.push(chain_convention(self.plugin_id));
            if let Some(previous) = self.previous_skill {
                sections.push(format!(
                    "PREVIOUS SKILL RESULT:\nThe previous skill \"{previous}\" may have saved \
                     results at: output/{previous}-result.md\nRead this file FIRST using the Read \
                     tool before starting your workflow. If it does not exist, continue without it."
                ));
            }
            if let Some(document) = self.document {
                sections.push(format!("{SKILL_INSTRUCTIONS_HEADER}\n{document}"));
            }
        }

        sections.join("\n\n")
    }

    fn delegation_guidance(&self) -> String {
        let mut guidance = DELEGATION_GUIDANCE.to_string();
        if !self.roster.is_empty() {
            guidance.push_str("\nAVAILABLE AGENTS:");
            for (name, agent) in self.roster {
                let _ = write!(
                    guidance,
                    "\n  - \"{name}\" ({}): {}",
                    agent.model.as_deref().unwrap_or("sonnet"),
                    agent.description
                );
            }
            guidance.push_str("\nUse the full name as subagent_type.");
        }
        guidance
    }
}

/// Inputs for the user prompt of the first run of an invocation.
#[derive(Debug, Clone, Copy)]
pub struct UserPromptBuilder<'a> {
    pub mode: PromptMode,
    pub input: Option<&'a str>,
    /// Whether the run resumes an earlier runtime session.
    pub resuming: bool,
    pub attachments: &'a [String],
    pub override_language: Option<&'a str>,
}

impl UserPromptBuilder<'_> {
    #[must_use]
    pub fn build(&self) -> String {
        let input = self.input.filter(|i| !i.trim().is_empty());

        let mut prompt = match (self.mode, self.resuming, input) {
            (_, true, Some(input)) | (PromptMode::FreeForm, false, Some(input)) => {
                input.to_string()
            }
            (PromptMode::Skill, true, None) => "The previous session was interrupted. Continue \
                executing the skill from where you left off. Do not repeat completed work."
                .to_string(),
            (PromptMode::FreeForm, _, None) => "Continue from where you left off.".to_string(),
            (PromptMode::Skill, false, Some(input)) => format!(
                "User input: {input}\n\nExecute the skill instructions in the system prompt, \
                 referring to the input above."
            ),
            (PromptMode::Skill, false, None) => {
                "Execute the skill instructions in the system prompt.".to_string()
            }
        };

        if let Some(language) = self.override_language.map(language_name) {
            let _ = write!(prompt, "\n\nRespond in {language}.");
        }

        if !self.attachments.is_empty() {
            prompt.push_str("\n\nAttached files:");
            for path in self.attachments {
                let _ = write!(prompt, "\n- {path}");
            }
            prompt.push_str("\n\nRead the above files using the Read tool and refer to their contents.");
        }

        prompt
    }
}

/// English name of a language code such as `en` or `pt-BR`.
///
/// Unknown codes are returned unchanged.
#[must_use]
pub fn language_name(code: &str) -> &str {
    let primary = code.split(['-', '_']).next().unwrap_or(code);
    match primary.to_ascii_lowercase().as_str() {
        "en" => "English",
        "ko" => "Korean",
        "ja" => "Japanese",
        "zh" => "Chinese",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "pt" => "Portuguese",
        "it" => "Italian",
        "ru" => "Russian",
        "vi" => "Vietnamese",
        _ => code,
    }
}

/// Prompt for an automatic continuation after an unfinished run.
#[must_use]
pub fn continuation_prompt(mode: PromptMode, override_language: Option<&str>) -> String {
    let mut prompt = match mode {
        PromptMode::Skill => {
            "Continue executing the skill from where you left off. Do not repeat completed work."
        }
        PromptMode::FreeForm => "Continue from where you left off. Do not repeat completed work.",
    }
    .to_string();
    if let Some(language) = override_language.map(language_name) {
        let _ = write!(prompt, " Respond in {language}.");
    }
    prompt
}
