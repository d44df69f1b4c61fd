//! File-backed agent registry and roster merging.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::Deserialize;
use skillflow_core::{AgentDefinition, AgentRegistry, AgentRoster};

/// Merge the orchestration roster with a plugin roster.
///
/// On a name collision the plugin entry wins.
#[must_use]
pub fn merge_rosters(orchestration: AgentRoster, plugin: AgentRoster) -> AgentRoster {
    let mut merged = orchestration;
    merged.extend(plugin);
    merged
}

/// Agent entry as stored in a plugin registration file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredAgent {
    description: String,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    disallowed_tools: Option<Vec<String>>,
}

/// Plugin registration file: `<plugin_dir>/<plugin_id>.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PluginRegistration {
    #[serde(default)]
    agents: BTreeMap<String, RegisteredAgent>,
    /// Skill name to the short agent names it uses.
    #[serde(default)]
    skill_agent_map: Option<BTreeMap<String, Vec<String>>>,
}

impl PluginRegistration {
    /// Select the agents a skill needs.
    ///
    /// With a skill mapping only the mapped agents are included, with their
    /// full prompts. Without one every agent is included with its description
    /// as prompt, which keeps the roster small.
    fn roster_for(self, skill_name: Option<&str>) -> AgentRoster {
        let selected = skill_name.and_then(|skill| {
            self.skill_agent_map
                .as_ref()
                .and_then(|map| map.get(skill))
                .cloned()
        });

        self.agents
            .into_iter()
            .filter_map(|(fqn, agent)| {
                let prompt = match &selected {
                    Some(names) => {
                        let short = fqn.split(':').nth(1).unwrap_or(&fqn);
                        if !names.iter().any(|n| n == short) {
                            return None;
                        }
                        agent.prompt.unwrap_or_else(|| agent.description.clone())
                    }
                    None => agent.description.clone(),
                };
                Some((
                    fqn,
                    AgentDefinition {
                        description: agent.description,
                        prompt,
                        model: agent.model,
                        disallowed_tools: agent.disallowed_tools,
                    },
                ))
            })
            .collect()
    }
}

/// Agent registry backed by JSON files.
///
/// Absent or unreadable files yield empty rosters.
#[derive(Debug, Clone, Default)]
pub struct FileAgentRegistry {
    orchestration_file: Option<PathBuf>,
    plugin_dir: Option<PathBuf>,
}

impl FileAgentRegistry {
    #[must_use]
    pub const fn new(orchestration_file: Option<PathBuf>, plugin_dir: Option<PathBuf>) -> Self {
        Self {
            orchestration_file,
            plugin_dir,
        }
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::error!(path = %path.display(), "Failed to read agent file: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Skipping malformed agent file: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl AgentRegistry for FileAgentRegistry {
    async fn orchestration_agents(&self) -> AgentRoster {
        let Some(path) = &self.orchestration_file else {
            return AgentRoster::new();
        };
        let roster: AgentRoster = Self::read_json(path).await.unwrap_or_default();
        tracing::debug!("Loaded {} orchestration agents", roster.len());
        roster
    }

    async fn plugin_agents(&self, plugin_id: &str, skill_name: Option<&str>) -> AgentRoster {
        let Some(dir) = &self.plugin_dir else {
            return AgentRoster::new();
        };
        if plugin_id.is_empty() || plugin_id.contains(&['/', '\\'][..]) {
            return AgentRoster::new();
        }

        let path = dir.join(format!("{plugin_id}.json"));
        let Some(registration) = Self::read_json::<PluginRegistration>(&path).await else {
            return AgentRoster::new();
        };
        let total = registration.agents.len();
        let roster = registration.roster_for(skill_name);
        tracing::info!(
            "Loaded {} of {total} registered agents for plugin \"{plugin_id}\"",
            roster.len()
        );
        roster
    }
}
