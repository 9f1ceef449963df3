use serde::Deserialize;
use std::{env, path::Path, path::PathBuf};
use thiserror::Error;

use minicoder_context::TrimPolicy;
use minicoder_types::{ApiKey, ModelName, OutputLimits};

use crate::DEFAULT_SYSTEM_PROMPT;

/// Environment variable consulted when the config carries no key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Default, Deserialize)]
pub struct MinicoderConfig {
    pub app: Option<AppConfig>,
    pub api_keys: Option<ApiKeys>,
    pub openai: Option<OpenAiConfig>,
    pub context: Option<ContextConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    pub model: Option<String>,
    pub max_completion_tokens: Option<u32>,
    /// Replaces the built-in conversation instructions.
    pub system_prompt: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct ApiKeys {
    pub openai: Option<String>,
}

// Keys never reach logs.
impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked = if self.openai.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("ApiKeys").field("openai", &masked).finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenAiConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContextConfig {
    pub trim_limit: Option<usize>,
    pub trim_keep_tail: Option<usize>,
}

/// Replace `${VAR}` with the variable's value; unset variables become empty.
/// Unterminated `${` and empty names are kept literally.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find('}') {
            Some(close) if close > 0 => {
                let replacement = env::var(&after[..close]).unwrap_or_default();
                out.push_str(&replacement);
                rest = &after[close + 1..];
            }
            _ => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

impl MinicoderConfig {
    /// Load `~/.minicoder/config.toml`; a missing file is not an error.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!(path = %path.display(), %source, "Failed to read config");
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        toml::from_str(&content).map_err(|source| {
            tracing::warn!(path = %path.display(), %source, "Failed to parse config");
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Configured key after `${VAR}` expansion, else the environment.
    #[must_use]
    pub fn api_key(&self) -> Option<ApiKey> {
        self.api_keys
            .as_ref()
            .and_then(|keys| keys.openai.as_deref())
            .map(expand_env_vars)
            .and_then(|raw| ApiKey::new(raw.trim()).ok())
            .or_else(|| {
                env::var(OPENAI_API_KEY_ENV)
                    .ok()
                    .and_then(|raw| ApiKey::new(raw.trim()).ok())
            })
    }

    #[must_use]
    pub fn model(&self) -> ModelName {
        self.app
            .as_ref()
            .and_then(|app| app.model.as_deref())
            .and_then(|raw| ModelName::new(raw.trim()).ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn output_limits(&self) -> OutputLimits {
        self.app
            .as_ref()
            .and_then(|app| app.max_completion_tokens)
            .filter(|&tokens| tokens > 0)
            .map(OutputLimits::new)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn system_prompt(&self) -> &str {
        self.app
            .as_ref()
            .and_then(|app| app.system_prompt.as_deref())
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.openai
            .as_ref()
            .and_then(|openai| openai.base_url.as_deref())
            .map(expand_env_vars)
            .filter(|url| !url.trim().is_empty())
    }

    #[must_use]
    pub fn trim_policy(&self) -> TrimPolicy {
        let defaults = TrimPolicy::default();
        let Some(context) = &self.context else {
            return defaults;
        };
        TrimPolicy {
            limit: context.trim_limit.unwrap_or(defaults.limit),
            keep_tail: context.trim_keep_tail.unwrap_or(defaults.keep_tail),
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".minicoder").join("config.toml"))
}
