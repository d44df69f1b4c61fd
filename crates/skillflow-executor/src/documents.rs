//! Filesystem-backed skill documents.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use skillflow_core::{DocumentError, SkillDocuments};

/// File name of a skill's instruction document.
pub const SKILL_FILE: &str = "SKILL.md";

/// Reads `<project>/skills/<skill>/SKILL.md`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSkillDocuments;

impl FsSkillDocuments {
    /// Location of a skill's document within a project.
    #[must_use]
    pub fn path(skill_name: &str, project_dir: &Path) -> PathBuf {
        project_dir.join("skills").join(skill_name).join(SKILL_FILE)
    }
}

#[async_trait]
impl SkillDocuments for FsSkillDocuments {
    async fn load(&self, skill_name: &str, project_dir: &Path) -> Result<String, DocumentError> {
        // Skill names come from request paths.
        if skill_name.is_empty() || skill_name.contains(&['/', '\\'][..]) || skill_name.starts_with('.') {
            return Err(DocumentError::NotFound {
                skill: skill_name.to_string(),
            });
        }

        let path = Self::path(skill_name, project_dir);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                tracing::info!(
                    "Loaded {SKILL_FILE} for \"{skill_name}\" ({} chars)",
                    content.chars().count()
                );
                Ok(content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::error!(path = %path.display(), "{SKILL_FILE} not found");
                Err(DocumentError::NotFound {
                    skill: skill_name.to_string(),
                })
            }
            Err(source) => Err(DocumentError::Io {
                skill: skill_name.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_existing_skill() {
        let dir = tempfile::tempdir().unwrap();
        let path = FsSkillDocuments::path("deploy", dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "### Step 1: Go").unwrap();

        let content = tokio_test::assert_ok!(FsSkillDocuments.load("deploy", dir.path()).await);
        assert_eq!(content, "### Step 1: Go");
    }

    #[tokio::test]
    async fn test_missing_skill() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsSkillDocuments.load("nope", dir.path()).await.unwrap_err();
        assert_eq!(err.to_string(), "Skill \"nope\" not found");
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FsSkillDocuments.load("../etc", dir.path()).await,
            Err(DocumentError::NotFound { .. })
        ));
    }
}
