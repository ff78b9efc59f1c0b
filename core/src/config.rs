//! Chat configuration loaded from `config.toml`.

use crate::error::AgentChatError;
use crate::error::Result;
use crate::serializer::SerializerOptions;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;

pub const CONFIG_TOML_FILE: &str = "config.toml";

/// Environment variable overriding the home directory.
pub const AGENTCHAT_HOME_ENV: &str = "AGENTCHAT_HOME";

const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_MAX_TURNS: usize = 8;

/// Settings a group chat and its tooling are built from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Upper bound on turns taken by one run of the turn loop.
    pub max_turns: usize,
    pub serializer: SerializerOptions,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            max_turns: DEFAULT_MAX_TURNS,
            serializer: SerializerOptions::default(),
        }
    }
}

impl ChatConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ChatConfig = toml::from_str(contents)
            .map_err(|e| AgentChatError::Configuration(format!("invalid config: {e}")))?;
        if config.max_turns == 0 {
            return Err(AgentChatError::Configuration(
                "max_turns must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Loads `config.toml` from [`find_agentchat_home`].
    pub fn load_from_home() -> Result<Self> {
        let home = find_agentchat_home()?;
        Self::load(&home.join(CONFIG_TOML_FILE))
    }
}

/// Returns `$AGENTCHAT_HOME` when set and non-empty, else `~/.agentchat`.
pub fn find_agentchat_home() -> std::io::Result<PathBuf> {
    let configured = std::env::var(AGENTCHAT_HOME_ENV).ok();
    resolve_home(configured.as_deref(), dirs::home_dir())
}

/// An explicit directory must exist; the fallback under `user_home` need not.
fn resolve_home(
    configured: Option<&str>,
    user_home: Option<PathBuf>,
) -> std::io::Result<PathBuf> {
    match configured {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).canonicalize(),
        _ => user_home
            .map(|home| home.join(".agentchat"))
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no home directory to put .agentchat in",
                )
            }),
    }
}
