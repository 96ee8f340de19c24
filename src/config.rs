//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::commands::{CommandTable, DEFAULT_DEDUPE_WINDOW};

const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_STREAM_RESTARTS: u32 = 5;

/// Timing and retry policy of the lifecycle controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Interval in which a repeated command keyword is not dispatched again
    pub dedupe_window: Duration,
    /// Debounce before ambient listening is restarted
    pub ambient_restart_delay: Duration,
    /// Consecutive self-ended active streams tolerated without any speech
    pub max_stream_restarts: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
            ambient_restart_delay: DEFAULT_RESTART_DELAY,
            max_stream_restarts: DEFAULT_MAX_STREAM_RESTARTS,
        }
    }
}

/// Persisted user settings read at restart decision points
pub trait Settings: Send + Sync {
    fn hands_free_enabled(&self) -> bool;
}

/// In-memory settings that can be toggled while the controller runs
#[derive(Debug, Default)]
pub struct SharedSettings {
    hands_free: AtomicBool,
}

impl SharedSettings {
    pub fn new(hands_free: bool) -> Self {
        Self {
            hands_free: AtomicBool::new(hands_free),
        }
    }

    pub fn set_hands_free(&self, enabled: bool) {
        self.hands_free.store(enabled, Ordering::SeqCst);
    }
}

impl Settings for SharedSettings {
    fn hands_free_enabled(&self) -> bool {
        self.hands_free.load(Ordering::SeqCst)
    }
}

/// Optional `voice.json` in the data directory
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    hands_free: Option<bool>,
    commands_path: Option<PathBuf>,
    dedupe_window_ms: Option<u64>,
    ambient_restart_delay_ms: Option<u64>,
    max_stream_restarts: Option<u32>,
}

/// Voice subsystem configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Initial value of the hands-free setting
    pub hands_free: bool,

    /// Command table file; the built-in table is used when unset
    pub commands_path: Option<PathBuf>,

    pub controller: ControllerConfig,
}

impl Config {
    /// Load configuration from environment, `voice.json` and defaults
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration with a custom environment lookup
    pub fn load_with<F>(env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = env("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("second-brain");

        let file = Self::read_file_config(&data_dir.join("voice.json"))?;
        let mut controller = ControllerConfig::default();
        if let Some(ms) = parse_env(&env, "SECOND_BRAIN_DEDUPE_MS")?.or(file.dedupe_window_ms) {
            controller.dedupe_window = Duration::from_millis(ms);
        }
        if let Some(ms) =
            parse_env(&env, "SECOND_BRAIN_RESTART_DELAY_MS")?.or(file.ambient_restart_delay_ms)
        {
            controller.ambient_restart_delay = Duration::from_millis(ms);
        }
        if let Some(max) = file.max_stream_restarts {
            controller.max_stream_restarts = max;
        }

        let hands_free = parse_env(&env, "SECOND_BRAIN_HANDS_FREE")?
            .or(file.hands_free)
            .unwrap_or(true);
        let commands_path = env("SECOND_BRAIN_COMMANDS")
            .map(PathBuf::from)
            .or(file.commands_path);

        Ok(Self {
            data_dir,
            hands_free,
            commands_path,
            controller,
        })
    }

    /// Load the configured command table, or the built-in one
    pub fn command_table(&self) -> Result<CommandTable> {
        match &self.commands_path {
            Some(path) => CommandTable::load(path)
                .with_context(|| format!("failed to load command table {}", path.display())),
            None => Ok(CommandTable::builtin()),
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    fn read_file_config(path: &Path) -> Result<FileConfig> {
        if !path.exists() {
            debug!(?path, "no voice config file, using defaults");
            return Ok(FileConfig::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("failed to parse {}", path.display()))
    }
}

fn parse_env<F, T>(env: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env(key)
        .map(|value| value.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("invalid value for {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let home = tempfile::tempdir().unwrap();
        let config = Config::load_with(env_from(&[("HOME", home.path().to_str().unwrap())])).unwrap();
        assert!(config.data_dir.to_string_lossy().contains("second-brain"));
        assert!(config.hands_free);
        assert!(config.commands_path.is_none());
        assert_eq!(config.controller, ControllerConfig::default());
        assert_eq!(config.controller.dedupe_window, Duration::from_millis(1500));
    }

    #[test]
    fn test_env_overrides() {
        let home = tempfile::tempdir().unwrap();
        let config = Config::load_with(env_from(&[
            ("HOME", home.path().to_str().unwrap()),
            ("SECOND_BRAIN_HANDS_FREE", "false"),
            ("SECOND_BRAIN_DEDUPE_MS", "800"),
            ("SECOND_BRAIN_COMMANDS", "/tmp/commands.json"),
        ]))
        .unwrap();
        assert!(!config.hands_free);
        assert_eq!(config.controller.dedupe_window, Duration::from_millis(800));
        assert_eq!(config.commands_path, Some(PathBuf::from("/tmp/commands.json")));
    }

    #[test]
    fn test_invalid_env_value_is_an_error() {
        let home = tempfile::tempdir().unwrap();
        let result = Config::load_with(env_from(&[
            ("HOME", home.path().to_str().unwrap()),
            ("SECOND_BRAIN_HANDS_FREE", "sometimes"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_file_config_is_read() {
        let home = tempfile::tempdir().unwrap();
        let data_dir = home.path().join(".local/share/second-brain");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(
            data_dir.join("voice.json"),
            r#"{"hands_free": false, "ambient_restart_delay_ms": 250, "max_stream_restarts": 2}"#,
        )
        .unwrap();

        let config = Config::load_with(env_from(&[("HOME", home.path().to_str().unwrap())])).unwrap();
        assert!(!config.hands_free);
        assert_eq!(config.controller.ambient_restart_delay, Duration::from_millis(250));
        assert_eq!(config.controller.max_stream_restarts, 2);
    }

    #[test]
    fn test_missing_home_fails() {
        assert!(Config::load_with(|_| None).is_err());
    }

    #[test]
    fn test_shared_settings_toggle() {
        let settings = SharedSettings::new(false);
        assert!(!settings.hands_free_enabled());
        settings.set_hands_free(true);
        assert!(settings.hands_free_enabled());
    }
}
