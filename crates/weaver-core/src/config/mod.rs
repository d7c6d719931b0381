//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory (relative to a vault root) holding Cognitive Weaver state
pub const STATE_DIR: &str = ".weaver";

/// Default knowledge graph file name inside [`STATE_DIR`]
pub const GRAPH_FILE_NAME: &str = "knowledge_graph.json";

/// Cognitive Weaver configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub oracle: OracleConfig,
    pub scan: ScanConfig,
    pub keywords: KeywordConfig,
    pub annotate: AnnotateConfig,
    pub pipeline: PipelineConfig,
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    /// openai, deepseek or openrouter
    pub provider: String,
    /// Overrides the provider's default endpoint
    pub base_url: Option<String>,
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    /// Use the rule-based offline oracle instead of the remote service
    pub offline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_prompt_chars: usize,
    /// Occurrences quoted as evidence in a same-concept prompt
    pub max_evidence: usize,
    pub fallback_confidence: f32,
}

/// Shape of the wait between oracle retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Exponential,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub extensions: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub folders_to_scan: Vec<PathBuf>,
    /// Characters of surrounding text captured around an occurrence
    pub context_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub min_occurrences: usize,
    pub extra_stop_words: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotateConfig {
    pub backup_suffix: String,
    pub marker_placement: MarkerPlacement,
}

/// Where a relationship marker is inserted relative to its link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPlacement {
    /// At the end of the line holding the link
    LineEnd,
    /// Directly after the closing brackets of the link
    AfterOccurrence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_concurrency: usize,
    pub debounce_ms: u64,
    pub event_queue_capacity: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Graph file; defaults to `<root>/.weaver/knowledge_graph.json`
    pub path: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: "openai".to_string(),
            base_url: None,
            default_model: "gpt-3.5-turbo".to_string(),
            temperature: 0.1,
            max_tokens: 50,
            timeout_secs: 60,
            offline: false,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_prompt_chars: 2000,
            max_evidence: 5,
            fallback_confidence: 0.1,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec![".md".to_string()],
            ignore_patterns: vec![
                "/.git/".to_string(),
                "/.obsidian/".to_string(),
                format!("/{}/", STATE_DIR),
            ],
            folders_to_scan: Vec::new(),
            context_window: 100,
        }
    }
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 2,
            extra_stop_words: Vec::new(),
        }
    }
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            backup_suffix: ".bak".to_string(),
            marker_placement: MarkerPlacement::LineEnd,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            debounce_ms: 2000,
            event_queue_capacity: 256,
        }
    }
}

impl LlmConfig {
    /// Endpoint for the configured provider
    pub fn resolved_base_url(&self) -> anyhow::Result<String> {
        if let Some(url) = &self.base_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        match self.provider.to_lowercase().as_str() {
            "openai" => Ok("https://api.openai.com/v1".to_string()),
            "deepseek" => Ok("https://api.deepseek.com".to_string()),
            "openrouter" => Ok("https://openrouter.ai/api/v1".to_string()),
            other => Err(anyhow!("Unsupported AI provider: {}", other)),
        }
    }

    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        let provider_var = match self.provider.to_lowercase().as_str() {
            "deepseek" => "DEEPSEEK_API_KEY",
            "openrouter" => "OPENROUTER_API_KEY",
            _ => "OPENAI_API_KEY",
        };

        Ok(env::var("WEAVER_API_KEY")
            .or_else(|_| env::var(provider_var))
            .ok()
            .filter(|key| !key.trim().is_empty()))
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                let chars: Vec<char> = key.chars().collect();
                if chars.len() <= 4 {
                    "***".to_string()
                } else {
                    let suffix: String = chars[chars.len() - 4..].iter().collect();
                    format!("***{}", suffix)
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl PipelineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl GraphConfig {
    /// Graph file location for a vault rooted at `root`
    pub fn resolve_path(&self, root: &Path) -> PathBuf {
        match &self.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.join(STATE_DIR).join(GRAPH_FILE_NAME),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("WEAVER_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("cognitive-weaver")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`, or from the default location
    ///
    /// A missing file yields the defaults without creating anything.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(anyhow!("Config file not found: {}", path.display()));
                }
                path.to_path_buf()
            }
            None => Self::config_path()?,
        };

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to `path`, or to the default location
    pub fn save(&self, path: Option<&Path>) -> anyhow::Result<PathBuf> {
        self.validate()?;

        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(path)
    }

    /// Write the default configuration to `path` unless a file already exists there
    pub fn write_default(path: &Path) -> anyhow::Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        Config::default().save(Some(path))?;
        Ok(true)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;
        self.llm.resolved_base_url()?;

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
        }
        if self.oracle.max_attempts == 0 {
            return Err(anyhow!("oracle.max_attempts must be at least 1"));
        }
        if self.oracle.max_delay_ms < self.oracle.base_delay_ms {
            return Err(anyhow!("oracle.max_delay_ms must not be below oracle.base_delay_ms"));
        }
        if !(0.0..=1.0).contains(&self.oracle.fallback_confidence) {
            return Err(anyhow!("oracle.fallback_confidence must be between 0.0 and 1.0"));
        }
        if self.scan.extensions.is_empty() {
            return Err(anyhow!("scan.extensions must list at least one extension"));
        }
        if self.keywords.min_occurrences < 2 {
            return Err(anyhow!("keywords.min_occurrences must be at least 2"));
        }
        if self.annotate.backup_suffix.is_empty() {
            return Err(anyhow!("annotate.backup_suffix must not be empty"));
        }
        if self.pipeline.max_concurrency == 0 {
            return Err(anyhow!("pipeline.max_concurrency must be at least 1"));
        }
        if self.pipeline.event_queue_capacity == 0 {
            return Err(anyhow!("pipeline.event_queue_capacity must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // LLM settings
            "llm.provider" => Ok(self.llm.provider.clone()),
            "llm.base_url" => self.llm.resolved_base_url(),
            "llm.default_model" => Ok(self.llm.default_model.clone()),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),
            "llm.offline" => Ok(self.llm.offline.to_string()),

            // Oracle settings
            "oracle.max_attempts" => Ok(self.oracle.max_attempts.to_string()),
            "oracle.backoff" => Ok(match self.oracle.backoff {
                BackoffKind::Exponential => "exponential".to_string(),
                BackoffKind::Fixed => "fixed".to_string(),
            }),
            "oracle.base_delay_ms" => Ok(self.oracle.base_delay_ms.to_string()),
            "oracle.max_delay_ms" => Ok(self.oracle.max_delay_ms.to_string()),

            // Scan settings
            "scan.extensions" => Ok(self.scan.extensions.join(", ")),
            "scan.ignore_patterns" => Ok(self.scan.ignore_patterns.join(", ")),
            "scan.folders_to_scan" => Ok(self
                .scan
                .folders_to_scan
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")),
            "scan.context_window" => Ok(self.scan.context_window.to_string()),

            "keywords.min_occurrences" => Ok(self.keywords.min_occurrences.to_string()),
            "annotate.backup_suffix" => Ok(self.annotate.backup_suffix.clone()),
            "pipeline.max_concurrency" => Ok(self.pipeline.max_concurrency.to_string()),
            "pipeline.debounce_ms" => Ok(self.pipeline.debounce_ms.to_string()),

            // API key (special handling - show redacted)
            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok("(not set - use WEAVER_API_KEY or the provider's API key env var)".to_string()),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `weaver config show` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "llm.provider" => {
                let valid = ["openai", "deepseek", "openrouter"];
                if !valid.contains(&value) {
                    return Err(anyhow!(
                        "Invalid provider: {}. Valid options: {}",
                        value,
                        valid.join(", ")
                    ));
                }
                self.llm.provider = value.to_string();
            }
            "llm.base_url" => {
                self.llm.base_url = Some(value.to_string()).filter(|v| !v.is_empty());
            }
            "llm.default_model" => {
                self.llm.default_model = value.to_string();
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }
            "llm.offline" => {
                self.llm.offline = value
                    .parse()
                    .with_context(|| format!("Invalid offline value: {}", value))?;
            }
            "oracle.max_attempts" => {
                let attempts: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid max_attempts value: {}", value))?;
                if attempts == 0 {
                    return Err(anyhow!("oracle.max_attempts must be at least 1"));
                }
                self.oracle.max_attempts = attempts;
            }
            "oracle.backoff" => {
                self.oracle.backoff = match value {
                    "exponential" => BackoffKind::Exponential,
                    "fixed" => BackoffKind::Fixed,
                    _ => {
                        return Err(anyhow!(
                            "Invalid backoff: {}. Valid options: exponential, fixed",
                            value
                        ));
                    }
                };
            }
            "oracle.base_delay_ms" => {
                self.oracle.base_delay_ms = value
                    .parse()
                    .with_context(|| format!("Invalid base_delay_ms value: {}", value))?;
            }
            "oracle.max_delay_ms" => {
                self.oracle.max_delay_ms = value
                    .parse()
                    .with_context(|| format!("Invalid max_delay_ms value: {}", value))?;
            }
            "scan.extensions" => {
                self.scan.extensions = split_list(value);
            }
            "scan.ignore_patterns" => {
                self.scan.ignore_patterns = split_list(value);
            }
            "scan.folders_to_scan" => {
                self.scan.folders_to_scan = split_list(value).into_iter().map(PathBuf::from).collect();
            }
            "scan.context_window" => {
                self.scan.context_window = value
                    .parse()
                    .with_context(|| format!("Invalid context_window value: {}", value))?;
            }
            "keywords.min_occurrences" => {
                let min: usize = value
                    .parse()
                    .with_context(|| format!("Invalid min_occurrences value: {}", value))?;
                if min < 2 {
                    return Err(anyhow!("keywords.min_occurrences must be at least 2"));
                }
                self.keywords.min_occurrences = min;
            }
            "annotate.backup_suffix" => {
                if value.is_empty() {
                    return Err(anyhow!("annotate.backup_suffix must not be empty"));
                }
                self.annotate.backup_suffix = value.to_string();
            }
            "pipeline.max_concurrency" => {
                let max: usize = value
                    .parse()
                    .with_context(|| format!("Invalid max_concurrency value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("pipeline.max_concurrency must be at least 1"));
                }
                self.pipeline.max_concurrency = max;
            }
            "pipeline.debounce_ms" => {
                self.pipeline.debounce_ms = value
                    .parse()
                    .with_context(|| format!("Invalid debounce_ms value: {}", value))?;
            }

            // API key cannot be set via config
            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the WEAVER_API_KEY environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `weaver config show` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "llm.provider",
            "llm.base_url",
            "llm.default_model",
            "llm.temperature",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.offline",
            "llm.api_key",
            "oracle.max_attempts",
            "oracle.backoff",
            "oracle.base_delay_ms",
            "oracle.max_delay_ms",
            "scan.extensions",
            "scan.ignore_patterns",
            "scan.folders_to_scan",
            "scan.context_window",
            "keywords.min_occurrences",
            "annotate.backup_suffix",
            "pipeline.max_concurrency",
            "pipeline.debounce_ms",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
