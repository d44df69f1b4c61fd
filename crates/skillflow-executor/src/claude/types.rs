//! Claude CLI option types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use skillflow_core::config::RuntimeSettings;

/// Tool permission mode passed to the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    #[default]
    AcceptEdits,
    Plan,
    BypassPermissions,
}

impl PermissionMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::Plan => "plan",
            Self::BypassPermissions => "bypassPermissions",
        }
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "acceptEdits" => Ok(Self::AcceptEdits),
            "plan" => Ok(Self::Plan),
            "bypassPermissions" => Ok(Self::BypassPermissions),
            other => Err(format!("unknown permission mode: {other}")),
        }
    }
}

/// Flags applied to every CLI run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub command: String,
    pub model: Option<String>,
    pub max_turns: u32,
    pub permission_mode: PermissionMode,
    pub disallowed_tools: Vec<String>,
}

impl CliOptions {
    /// Fixed arguments that select streaming JSON output.
    pub const STREAM_ARGS: [&'static str; 4] =
        ["--print", "--output-format", "stream-json", "--verbose"];

    /// Arguments shared by every run, after the streaming flags.
    #[must_use]
    pub fn base_args(&self) -> Vec<String> {
        let mut args: Vec<String> = Self::STREAM_ARGS.iter().map(ToString::to_string).collect();
        if let Some(model) = &self.model {
            args.extend(["--model".to_string(), model.clone()]);
        }
        args.extend([
            "--max-turns".to_string(),
            self.max_turns.to_string(),
            "--permission-mode".to_string(),
            self.permission_mode.as_str().to_string(),
        ]);
        if !self.disallowed_tools.is_empty() {
            args.extend([
                "--disallowedTools".to_string(),
                self.disallowed_tools.join(","),
            ]);
        }
        args
    }
}

impl From<&RuntimeSettings> for CliOptions {
    fn from(settings: &RuntimeSettings) -> Self {
        let permission_mode = settings.permission_mode.parse().unwrap_or_else(|e| {
            tracing::warn!("{e}, falling back to acceptEdits");
            PermissionMode::AcceptEdits
        });
        Self {
            command: settings.command.clone(),
            model: settings.model.clone(),
            max_turns: settings.max_turns,
            permission_mode,
            disallowed_tools: settings.disallowed_tools.clone(),
        }
    }
}
