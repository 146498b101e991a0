//! CLI command building
//!
//! [`CommandBuilder`] translates logical intents (prompt, resume, output
//! format, files, flags) into the argument vector the CLI accepts. Building
//! is pure and total; no value validation happens here.

use std::collections::HashMap;

use crate::config::ClaudeConfig;
use crate::types::{OutputFormat, SessionId};

/// Flag that lets the CLI write files without interactive permission prompts.
/// Emitted by default; suppressed in safe mode.
pub const SKIP_PERMISSIONS_FLAG: &str = "--dangerously-skip-permissions";

/// Builder for Claude CLI argument vectors.
///
/// Options keep first-insertion order; setting an existing key replaces its
/// value in place. Files are positional and order-preserving.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    skip_permissions: bool,
    options: Vec<(String, String)>,
    index: HashMap<String, usize>,
    flags: Vec<String>,
    files: Vec<String>,
}

impl CommandBuilder {
    /// Create a builder for the given executable
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            skip_permissions: true,
            options: Vec::new(),
            index: HashMap::new(),
            flags: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Create a builder seeded from configuration (executable and safe mode)
    #[must_use]
    pub fn from_config(config: &ClaudeConfig) -> Self {
        let mut builder = Self::new(config.cli_path.clone());
        builder.skip_permissions = !config.safe_mode;
        builder
    }

    /// Control the permission-skip flag directly
    #[must_use]
    pub fn skip_permissions(mut self, enabled: bool) -> Self {
        self.skip_permissions = enabled;
        self
    }

    /// Set the prompt. Last call wins.
    #[must_use]
    pub fn prompt(self, text: impl Into<String>) -> Self {
        self.option("p", text)
    }

    /// Set the output format
    #[must_use]
    pub fn output_format(self, format: OutputFormat) -> Self {
        self.option("output-format", format.as_str())
    }

    /// Resume a previous session by ID
    #[must_use]
    pub fn resume(self, session_id: &SessionId) -> Self {
        self.option("r", session_id.as_str())
    }

    /// Add a file argument. Repeatable; order is preserved.
    #[must_use]
    pub fn file(mut self, path: impl Into<String>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Add a boolean flag. Repeatable.
    #[must_use]
    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.flags.push(name.into());
        self
    }

    /// Set an option. A repeated key replaces the value but keeps the key's
    /// original position.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&at) => self.options[at].1 = value,
            None => {
                self.index.insert(key.clone(), self.options.len());
                self.options.push((key, value));
            }
        }
        self
    }

    /// Build the final argument vector
    #[must_use]
    pub fn build(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(2 + self.options.len() * 2 + self.flags.len());
        argv.push(self.program.clone());

        if self.skip_permissions {
            argv.push(SKIP_PERMISSIONS_FLAG.to_string());
        }

        for (key, value) in &self.options {
            argv.push(format_arg(key));
            argv.push(value.clone());
        }

        for flag in &self.flags {
            argv.push(format_arg(flag));
        }

        for file in &self.files {
            argv.push("--file".to_string());
            argv.push(file.clone());
        }

        argv
    }
}

fn format_arg(name: &str) -> String {
    if name.chars().count() == 1 {
        format!("-{name}")
    } else {
        format!("--{name}")
    }
}

impl std::fmt::Display for CommandBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.build().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_long_options_are_formatted_by_key_length() {
        let argv = CommandBuilder::new("claude")
            .prompt("hello")
            .output_format(OutputFormat::StreamJson)
            .build();

        assert_eq!(
            argv,
            vec![
                "claude",
                SKIP_PERMISSIONS_FLAG,
                "-p",
                "hello",
                "--output-format",
                "stream-json",
            ]
        );
    }

    #[test]
    fn options_keep_first_insertion_order() {
        let argv = CommandBuilder::new("claude")
            .skip_permissions(false)
            .option("output-format", "json")
            .option("r", "S1")
            .option("model", "opus")
            .build();

        assert_eq!(
            argv,
            vec![
                "claude",
                "--output-format",
                "json",
                "-r",
                "S1",
                "--model",
                "opus",
            ]
        );
    }

    #[test]
    fn duplicate_key_replaces_value_in_place() {
        let argv = CommandBuilder::new("claude")
            .skip_permissions(false)
            .option("a", "1")
            .option("model", "haiku")
            .option("a", "2")
            .build();

        assert_eq!(argv, vec!["claude", "-a", "2", "--model", "haiku"]);
    }

    #[test]
    fn last_prompt_wins() {
        let argv = CommandBuilder::new("claude")
            .skip_permissions(false)
            .prompt("first")
            .prompt("second")
            .build();

        assert_eq!(argv, vec!["claude", "-p", "second"]);
    }

    #[test]
    fn safety_flag_present_unless_safe_mode() {
        let config = ClaudeConfig::default();
        let argv = CommandBuilder::from_config(&config).prompt("x").build();
        assert_eq!(argv[1], SKIP_PERMISSIONS_FLAG);

        let safe = ClaudeConfig::builder().safe_mode(true).build();
        let argv = CommandBuilder::from_config(&safe).prompt("x").build();
        assert!(!argv.contains(&SKIP_PERMISSIONS_FLAG.to_string()));
        assert_eq!(argv, vec!["claude", "-p", "x"]);
    }

    #[test]
    fn flags_follow_options_and_files_are_last() {
        let argv = CommandBuilder::new("claude")
            .skip_permissions(false)
            .prompt("go")
            .flag("verbose")
            .flag("v")
            .file("a.txt")
            .file("b.txt")
            .build();

        assert_eq!(
            argv,
            vec![
                "claude", "-p", "go", "--verbose", "-v", "--file", "a.txt", "--file", "b.txt",
            ]
        );
    }

    #[test]
    fn build_is_repeatable() {
        let builder = CommandBuilder::new("claude").prompt("same");
        assert_eq!(builder.build(), builder.build());
    }
}
