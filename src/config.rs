use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kqlpair::agents::QUERY_VALIDATION_AGENT;
use kqlpair::chat::DEFAULT_APPROVAL_TOKEN;
use kqlpair::llm::AnthropicConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub chat: ChatConfig,
    pub transcript: TranscriptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub max_tool_rounds: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 8192,
            timeout_ms: 300000,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            max_tool_rounds: 5,
        }
    }
}

impl LlmConfig {
    pub fn client_config(&self) -> AnthropicConfig {
        let mut config = AnthropicConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            timeout: Duration::from_millis(self.timeout_ms),
            ..Default::default()
        };
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub max_iterations: u32,
    pub approval_token: String,
    pub approvers: Vec<String>,
    pub streaming: bool,
    /// Replaces the built-in query generation instructions
    pub generation_instructions: Option<PathBuf>,
    /// Replaces the built-in validation instructions
    pub validation_instructions: Option<PathBuf>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            approval_token: DEFAULT_APPROVAL_TOKEN.to_string(),
            approvers: vec![QUERY_VALIDATION_AGENT.to_string()],
            streaming: true,
            generation_instructions: None,
            validation_instructions: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    pub directory: PathBuf,
    pub save: bool,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            directory: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("kqlpair")
                .join("transcripts"),
            save: false,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chat.approval_token.trim().is_empty() {
            eyre::bail!("chat.approval_token must not be empty");
        }
        if self.chat.approvers.is_empty() {
            eyre::bail!("chat.approvers must name at least one agent");
        }
        if self.llm.api_key_env.trim().is_empty() {
            eyre::bail!("llm.api_key_env must not be empty");
        }
        if self.llm.max_tokens == 0 {
            eyre::bail!("llm.max_tokens must be > 0");
        }
        Ok(())
    }
}

/// Read an instructions override, if one is configured
pub fn read_instructions(path: Option<&PathBuf>) -> Result<Option<String>> {
    path.map(|p| fs::read_to_string(p).context(format!("Failed to read instructions from {}", p.display())))
        .transpose()
}
