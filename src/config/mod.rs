//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (for the `parley` binary)
//!
//! Every field has a default, so a file only needs the values it changes:
//!
//! ```toml
//! [backend]
//! kind = "remote"
//! model = "mistralai/mistral-7b-instruct"
//!
//! [simulation]
//! memory_length = 3
//! seed = 42
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::{BackendKind, DEFAULT_LOCAL_URL, DEFAULT_REMOTE_URL};
use crate::error::{ParleyError, Result};

/// Environment variable holding the local backend's base URL.
pub const ENV_LOCAL_URL: &str = "OLLAMA_URL";

/// Environment variable holding the remote backend's credential.
pub const ENV_API_KEY: &str = "OPENROUTER_API_KEY";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend selection and connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Prompting and sampling
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Memory, fallback, and run output
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ParleyError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content)
            .map_err(|e| ParleyError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment overrides on top of this config.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var(ENV_LOCAL_URL) {
            if !url.trim().is_empty() {
                self.backend.local_url = url;
            }
        }
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            if !key.trim().is_empty() {
                self.backend.api_key = Some(key);
            }
        }
        if let Ok(kind) = std::env::var("PARLEY_BACKEND") {
            match kind.parse() {
                Ok(kind) => self.backend.kind = kind,
                Err(e) => tracing::warn!("Ignoring PARLEY_BACKEND: {e}"),
            }
        }
        if let Ok(model) = std::env::var("PARLEY_MODEL") {
            if !model.trim().is_empty() {
                self.backend.model = Some(model);
            }
        }
        if let Ok(dir) = std::env::var("PARLEY_OUTPUT_DIR") {
            self.simulation.output_dir = PathBuf::from(dir);
        }
        self
    }

    /// Load from `path` (or the default config path if it exists), then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => {
                    tracing::debug!("Loading config from {}", path.display());
                    Self::from_file(path)?
                },
                _ => Self::default(),
            },
        };
        Ok(base.with_env())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.backend.model().trim().is_empty() {
            return Err(ParleyError::Config("model identifier is empty".to_string()));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ParleyError::Config("timeout_secs must be positive".to_string()));
        }
        if self.backend.kind == BackendKind::Remote
            && self.backend.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(ParleyError::Config(format!(
                "{ENV_API_KEY} must be set when the remote backend is selected"
            )));
        }
        let c = &self.conversation;
        if !c.closeness_threshold.is_finite() || c.closeness_threshold < 0.0 {
            return Err(ParleyError::Config(format!(
                "closeness_threshold must be a non-negative number, got {}",
                c.closeness_threshold
            )));
        }
        if !c.temperature.is_finite() || c.temperature < 0.0 {
            return Err(ParleyError::Config(format!(
                "temperature must be non-negative, got {}",
                c.temperature
            )));
        }
        let bound = self.simulation.perturbation_bound;
        if !bound.is_finite() || !(0.0..=1.0).contains(&bound) {
            return Err(ParleyError::Config(format!(
                "perturbation_bound must be in [0, 1], got {bound}"
            )));
        }
        Ok(())
    }
}

/// `<config dir>/parley/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("parley").join("config.toml"))
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Which provider to call
    pub kind: BackendKind,

    /// Model identifier; `None` uses the provider default
    pub model: Option<String>,

    /// Base URL of the local server
    pub local_url: String,

    /// Base URL of the remote API
    pub remote_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Remote credential, only ever read from the environment
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Local,
            model: None,
            local_url: DEFAULT_LOCAL_URL.to_string(),
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            timeout_secs: 120,
            api_key: None,
        }
    }
}

impl BackendConfig {
    /// Effective model identifier.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.kind.default_model())
    }
}

/// Prompting and sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Token budget per conversational turn
    pub max_tokens: u32,

    /// Sampling temperature for conversational turns
    pub temperature: f32,

    /// Token budget for the one-time persona rationale
    pub persona_max_tokens: u32,

    /// Sampling temperature for persona generation
    pub persona_temperature: f32,

    /// Opinion gap below which the devil's-advocate instruction is added
    pub closeness_threshold: f64,

    /// Characters of the opening turn kept in the display snippet
    pub snippet_chars: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 300,
            temperature: 0.8,
            persona_max_tokens: 50,
            persona_temperature: 0.8,
            closeness_threshold: 0.3,
            snippet_chars: 80,
        }
    }
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Memory entries included in each prompt
    pub memory_length: usize,

    /// Half-width of the uniform fallback perturbation
    pub perturbation_bound: f64,

    /// Generate a rationale per agent at setup
    pub generate_personas: bool,

    /// Root directory under which run directories are created
    pub output_dir: PathBuf,

    /// RNG seed for reproducible opinions and perturbations
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            memory_length: 5,
            perturbation_bound: 0.1,
            generate_personas: true,
            output_dir: PathBuf::from("runs"),
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.kind, BackendKind::Local);
        assert_eq!(config.backend.local_url, "http://localhost:11434");
        assert_eq!(config.backend.model(), "phi3:mini");
        assert_eq!(config.backend.timeout_secs, 120);
        assert_eq!(config.conversation.max_tokens, 300);
        assert_eq!(config.conversation.persona_max_tokens, 50);
        assert!((config.conversation.closeness_threshold - 0.3).abs() < f64::EPSILON);
        assert!((config.simulation.perturbation_bound - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.simulation.memory_length, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [backend]
            kind = "remote"
            model = "mistralai/mistral-7b-instruct"
            timeout_secs = 30

            [simulation]
            memory_length = 3
            seed = 42
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Remote);
        assert_eq!(config.backend.model(), "mistralai/mistral-7b-instruct");
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.backend.local_url, "http://localhost:11434");
        assert_eq!(config.simulation.memory_length, 3);
        assert_eq!(config.simulation.seed, Some(42));
        assert_eq!(config.conversation.max_tokens, 300);
    }

    #[test]
    fn test_remote_model_default() {
        let config = BackendConfig {
            kind: BackendKind::Remote,
            ..Default::default()
        };
        assert_eq!(config.model(), "meta-llama/llama-3.2-3b-instruct:free");
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = Config::default();
        config.backend.api_key = Some("sk-secret".to_string());
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("sk-secret"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.backend.model = Some("  ".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.backend.kind = BackendKind::Remote;
        assert!(config.validate().is_err());
        config.backend.api_key = Some("sk-test".to_string());
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.simulation.perturbation_bound = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.conversation.closeness_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ParleyError::Config(_)));
    }
}
