//! SDK configuration
//!
//! Configuration is an explicit value handed to each component's constructor.
//! There is no process-wide default: callers either build a [`ClaudeConfig`]
//! programmatically or load one from the environment once at startup.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClaudeError, Result};

/// Default deadline for a single CLI invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default read size for streaming output
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 8192;

/// Variable stripped from the child environment. The CLI bills API-key usage
/// separately from subscription usage, so an inherited key must never leak
/// into the spawned process.
pub const STRIPPED_ENV_VARS: &[&str] = &["ANTHROPIC_API_KEY"];

/// Loader-affecting variables that caller-supplied overrides may not set
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "NODE_OPTIONS",
];

/// Configuration for the Claude CLI SDK
#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    /// Name or path of the CLI executable
    pub cli_path: String,
    /// API key forwarded to the CLI as `CLAUDE_API_KEY`
    pub api_key: Option<String>,
    /// Default deadline for a single invocation
    pub default_timeout: Duration,
    /// Read size for streaming output
    pub stream_buffer_size: usize,
    /// Retry attempts added on top of the initial call
    pub max_retries: u32,
    /// Base delay between retries
    pub retry_delay: Duration,
    /// Safe mode suppresses `--dangerously-skip-permissions`
    pub safe_mode: bool,
    /// Forward `CLAUDE_DEBUG=1` to the CLI
    pub debug_mode: bool,
    /// Emit `--verbose` on session-aware queries even for non-stream formats
    pub verbose_logging: bool,
    /// Text prepended to every session-aware prompt
    pub prefix_prompt: Option<String>,
    /// Base directory for workspaces; temp dir when unset
    pub workspace_base_path: Option<PathBuf>,
    /// Remove all tracked workspaces when the client closes
    pub workspace_cleanup_on_exit: bool,
    /// Executables the executor may spawn; empty means all allowed
    pub allowed_commands: Vec<String>,
    /// Extra environment variables for the child process
    pub env: HashMap<String, String>,
    /// Log file appended to by [`ClaudeConfig::init_logging`]; stderr when
    /// unset
    pub log_file: Option<PathBuf>,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            cli_path: "claude".to_string(),
            api_key: None,
            default_timeout: DEFAULT_TIMEOUT,
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            safe_mode: false,
            debug_mode: false,
            verbose_logging: false,
            prefix_prompt: None,
            workspace_base_path: None,
            workspace_cleanup_on_exit: true,
            allowed_commands: Vec::new(),
            env: HashMap::new(),
            log_file: None,
        }
    }
}

impl ClaudeConfig {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> ClaudeConfigBuilder {
        ClaudeConfigBuilder::default()
    }

    /// Load configuration from process environment variables.
    ///
    /// Variables are read once here, never re-read per call.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_map(&env::vars().collect())
    }

    pub(crate) fn from_env_map(vars: &HashMap<String, String>) -> Self {
        let mut config = Self::default();

        if let Some(key) = vars.get("CLAUDE_API_KEY") {
            config.api_key = Some(key.clone());
        }
        if let Some(path) = vars.get("CLAUDE_CLI_PATH") {
            if !path.trim().is_empty() {
                config.cli_path = path.trim().to_string();
            }
        }
        if let Some(timeout) = vars.get("CLAUDE_DEFAULT_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<f64>() {
                if secs > 0.0 {
                    config.default_timeout = Duration::from_secs_f64(secs);
                }
            }
        }
        if let Some(base) = vars.get("CLAUDE_WORKSPACE_BASE_PATH") {
            config.workspace_base_path = Some(PathBuf::from(base));
        }
        if let Some(log_file) = vars.get("CLAUDE_LOG_FILE") {
            config.log_file = Some(PathBuf::from(log_file));
        }
        config.safe_mode = vars
            .get("CLAUDE_SAFE_MODE")
            .is_some_and(|v| parse_bool(v));
        config.debug_mode = vars.get("CLAUDE_DEBUG").is_some_and(|v| parse_bool(v));

        config
    }

    /// Validate values that cannot be encoded in the type system
    pub fn validate(&self) -> Result<()> {
        if self.cli_path.trim().is_empty() {
            return Err(ClaudeError::invalid_config("cli_path cannot be empty"));
        }
        if self.default_timeout.is_zero() {
            return Err(ClaudeError::invalid_config(
                "default_timeout must be positive",
            ));
        }
        if self.stream_buffer_size == 0 {
            return Err(ClaudeError::invalid_config(
                "stream_buffer_size must be positive",
            ));
        }
        Ok(())
    }

    /// Build the environment for a spawned child process.
    ///
    /// Starts from a snapshot of the parent environment, strips
    /// [`STRIPPED_ENV_VARS`], applies config overrides (minus
    /// [`DANGEROUS_ENV_VARS`]), and injects the config's own variables.
    #[must_use]
    pub fn subprocess_env(&self) -> HashMap<String, String> {
        sanitize_env(env::vars().collect(), &self.env, self)
    }

    /// Locate the CLI executable, searching PATH and common install locations
    pub fn resolve_cli_path(&self) -> Result<PathBuf> {
        let candidate = PathBuf::from(&self.cli_path);
        if candidate.components().count() > 1 {
            if candidate.is_file() {
                return Ok(candidate);
            }
            return Err(ClaudeError::cli_not_found(&self.cli_path));
        }

        if let Ok(path) = which::which(&self.cli_path) {
            return Ok(path);
        }

        let home = env::var("HOME").unwrap_or_else(|_| String::from("/root"));
        let locations = [
            PathBuf::from(&home).join(".npm-global/bin").join(&self.cli_path),
            PathBuf::from("/usr/local/bin").join(&self.cli_path),
            PathBuf::from(&home).join(".local/bin").join(&self.cli_path),
            PathBuf::from(&home).join("node_modules/.bin").join(&self.cli_path),
            PathBuf::from(&home).join(".yarn/bin").join(&self.cli_path),
        ];

        for path in locations {
            if path.is_file() {
                return Ok(path);
            }
        }

        Err(ClaudeError::cli_not_found(&self.cli_path))
    }

    /// Initialize the process-wide `env_logger`, honoring this config.
    ///
    /// With `log_file` set, log output is appended to that file instead of
    /// stderr; `debug_mode` raises the default filter to debug. Safe to call
    /// more than once; only the first call installs a logger.
    pub fn init_logging(&self) -> Result<()> {
        let mut builder = env_logger::Builder::from_default_env();
        if self.debug_mode {
            builder.filter_level(log::LevelFilter::Debug);
        }
        if let Some(path) = &self.log_file {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        let _ = builder.try_init();
        Ok(())
    }

    /// Apply the configured prefix prompt, if any
    #[must_use]
    pub fn apply_prefix_prompt(&self, prompt: &str) -> String {
        match &self.prefix_prompt {
            Some(prefix) => format!("{prefix}{prompt}"),
            None => prompt.to_string(),
        }
    }
}

pub(crate) fn sanitize_env(
    mut base: HashMap<String, String>,
    overrides: &HashMap<String, String>,
    config: &ClaudeConfig,
) -> HashMap<String, String> {
    for var in STRIPPED_ENV_VARS {
        base.remove(*var);
    }

    for (key, value) in overrides {
        if DANGEROUS_ENV_VARS.contains(&key.as_str()) {
            log::warn!("Ignoring override of dangerous environment variable {key}");
            continue;
        }
        base.insert(key.clone(), value.clone());
    }

    if let Some(ref api_key) = config.api_key {
        base.insert("CLAUDE_API_KEY".to_string(), api_key.clone());
    }
    if config.debug_mode {
        base.insert("CLAUDE_DEBUG".to_string(), "1".to_string());
    }
    if config.verbose_logging {
        base.insert("CLAUDE_VERBOSE".to_string(), "1".to_string());
    }

    base
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Builder for [`ClaudeConfig`]
#[derive(Debug, Default)]
pub struct ClaudeConfigBuilder {
    config: ClaudeConfig,
}

impl ClaudeConfigBuilder {
    /// Set the CLI executable name or path
    #[must_use]
    pub fn cli_path(mut self, path: impl Into<String>) -> Self {
        self.config.cli_path = path.into();
        self
    }

    /// Set the API key forwarded to the CLI
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Set the default invocation deadline
    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Set the streaming read size
    #[must_use]
    pub fn stream_buffer_size(mut self, size: usize) -> Self {
        self.config.stream_buffer_size = size;
        self
    }

    /// Set the number of retry attempts
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the base retry delay
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Enable or disable safe mode
    #[must_use]
    pub fn safe_mode(mut self, enabled: bool) -> Self {
        self.config.safe_mode = enabled;
        self
    }

    /// Enable or disable debug mode
    #[must_use]
    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    /// Enable or disable verbose logging
    #[must_use]
    pub fn verbose_logging(mut self, enabled: bool) -> Self {
        self.config.verbose_logging = enabled;
        self
    }

    /// Set a prefix prepended to session-aware prompts
    #[must_use]
    pub fn prefix_prompt(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix_prompt = Some(prefix.into());
        self
    }

    /// Set the workspace base directory
    #[must_use]
    pub fn workspace_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.workspace_base_path = Some(path.into());
        self
    }

    /// Control workspace removal at client close
    #[must_use]
    pub fn workspace_cleanup_on_exit(mut self, enabled: bool) -> Self {
        self.config.workspace_cleanup_on_exit = enabled;
        self
    }

    /// Restrict spawnable executables to the given list
    #[must_use]
    pub fn allowed_commands(mut self, commands: Vec<String>) -> Self {
        self.config.allowed_commands = commands;
        self
    }

    /// Add an environment variable for the child process
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.insert(key.into(), value.into());
        self
    }

    /// Set a log file path
    #[must_use]
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_file = Some(path.into());
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> ClaudeConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn from_env_map_reads_known_variables() {
        let vars = env_map(&[
            ("CLAUDE_CLI_PATH", "/opt/bin/claude"),
            ("CLAUDE_DEFAULT_TIMEOUT", "45"),
            ("CLAUDE_SAFE_MODE", "true"),
            ("CLAUDE_DEBUG", "1"),
            ("CLAUDE_API_KEY", "sk-test"),
        ]);

        let config = ClaudeConfig::from_env_map(&vars);
        assert_eq!(config.cli_path, "/opt/bin/claude");
        assert_eq!(config.default_timeout, Duration::from_secs(45));
        assert!(config.safe_mode);
        assert!(config.debug_mode);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn from_env_map_ignores_invalid_timeout() {
        let vars = env_map(&[("CLAUDE_DEFAULT_TIMEOUT", "not-a-number")]);
        let config = ClaudeConfig::from_env_map(&vars);
        assert_eq!(config.default_timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn sanitize_env_strips_anthropic_api_key() {
        let base = env_map(&[("ANTHROPIC_API_KEY", "sk-ant"), ("HOME", "/home/u")]);
        let config = ClaudeConfig::default();
        let env = sanitize_env(base, &HashMap::new(), &config);
        assert!(!env.contains_key("ANTHROPIC_API_KEY"));
        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/u"));
    }

    #[test]
    fn sanitize_env_blocks_dangerous_overrides() {
        let overrides = env_map(&[("LD_PRELOAD", "/tmp/evil.so"), ("MY_VAR", "ok")]);
        let config = ClaudeConfig::default();
        let env = sanitize_env(HashMap::new(), &overrides, &config);
        assert!(!env.contains_key("LD_PRELOAD"));
        assert_eq!(env.get("MY_VAR").map(String::as_str), Some("ok"));
    }

    #[test]
    fn sanitize_env_injects_config_variables() {
        let config = ClaudeConfig::builder()
            .api_key("sk-config")
            .debug_mode(true)
            .build();
        let env = sanitize_env(HashMap::new(), &HashMap::new(), &config);
        assert_eq!(env.get("CLAUDE_API_KEY").map(String::as_str), Some("sk-config"));
        assert_eq!(env.get("CLAUDE_DEBUG").map(String::as_str), Some("1"));
    }

    #[test]
    fn init_logging_creates_the_configured_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sdk.log");
        let config = ClaudeConfig::builder().log_file(path.clone()).build();

        config.init_logging().unwrap();
        assert!(path.exists());
        // Later calls are no-ops, not errors.
        config.init_logging().unwrap();
    }

    #[test]
    fn resolve_cli_path_finds_binaries_on_path() {
        let config = ClaudeConfig::builder().cli_path("sh").build();
        let resolved = config.resolve_cli_path().unwrap();
        assert!(resolved.is_file());

        let missing = ClaudeConfig::builder()
            .cli_path("definitely-not-a-real-binary-3141")
            .build();
        assert!(matches!(
            missing.resolve_cli_path(),
            Err(ClaudeError::CliNotFound(_))
        ));
    }

    #[test]
    fn validate_rejects_empty_cli_path() {
        let config = ClaudeConfig::builder().cli_path("  ").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn prefix_prompt_is_applied_when_configured() {
        let config = ClaudeConfig::builder().prefix_prompt("[ctx] ").build();
        assert_eq!(config.apply_prefix_prompt("hello"), "[ctx] hello");

        let plain = ClaudeConfig::default();
        assert_eq!(plain.apply_prefix_prompt("hello"), "hello");
    }
}
