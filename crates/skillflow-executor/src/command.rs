//! Command building utilities.

use std::path::PathBuf;

use thiserror::Error;

use crate::resolve::resolve_executable_path;

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
    #[error("Executable not found: {0}")]
    NotFound(String),
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns error if the executable is not found.
    pub async fn into_resolved(self) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable = resolve_executable_path(&program)
            .await
            .ok_or(CommandBuildError::NotFound(program))?;
        Ok((executable, args))
    }
}

/// Builder for a CLI invocation: a base command line plus fixed parameters.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    /// Base command line, split with shell quoting rules.
    pub base: String,
    /// Parameters appended to every invocation.
    pub params: Vec<String>,
}

impl CommandBuilder {
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            params: Vec::new(),
        }
    }

    /// Append parameters.
    #[must_use]
    pub fn params<I>(mut self, more: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params.extend(more.into_iter().map(Into::into));
        self
    }

    /// Build the command with per-run arguments appended.
    ///
    /// # Errors
    /// Returns error if the base command cannot be split or is empty.
    pub fn build(&self, run_args: &[String]) -> Result<CommandParts, CommandBuildError> {
        let mut parts =
            shlex::split(&self.base).ok_or_else(|| CommandBuildError::InvalidBase(self.base.clone()))?;
        parts.extend(self.params.iter().cloned());
        parts.extend(run_args.iter().cloned());

        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }

        let program = parts.remove(0);
        Ok(CommandParts {
            program,
            args: parts,
        })
    }
}
