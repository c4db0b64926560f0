//! Validation of external compiler commands.

use crate::error::{Error, Result};

/// Checks a compiler command before it is handed to `sh -c`.
///
/// Strict mode rejects shell metacharacters so that the command can only
/// run a single program with fixed arguments.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    allow_shell: bool,
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self { allow_shell: true }
    }
}

impl CommandValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self { allow_shell: false }
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty command, or for shell features
    /// in strict mode.
    pub fn validate(&self, command: &str) -> Result<()> {
        if command.trim().is_empty() {
            return Err(Error::Config("compiler command cannot be empty".to_string()));
        }

        const SHELL_FEATURES: &[&str] = &[";", "&&", "||", "|", "`", "$", ">", "<"];
        if !self.allow_shell {
            if let Some(feature) = SHELL_FEATURES.iter().find(|f| command.contains(*f)) {
                return Err(Error::Config(format!(
                    "compiler command uses the shell feature '{}' which strict mode forbids: {}",
                    feature, command
                )));
            }
        }

        Ok(())
    }
}
