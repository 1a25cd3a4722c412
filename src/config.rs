use anyhow::{Context, Result};
use log::LevelFilter;
use serde::Deserialize;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

const CONFIG_PATH: &str = "~/.config/riverbridge/config.toml";

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: LevelFilter,
    /// Tool used to run commands when river's control interface is missing.
    #[serde(default = "default_fallback_command")]
    pub fallback_command: String,
    /// Pause after each batch of dispatched events. Zero disables it.
    #[serde(default = "default_dispatch_yield_ms")]
    pub dispatch_yield_ms: u64,
}

fn default_log_level() -> LevelFilter {
    LevelFilter::Warn
}

fn default_fallback_command() -> String {
    "riverctl".to_string()
}

fn default_dispatch_yield_ms() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            fallback_command: default_fallback_command(),
            dispatch_yield_ms: default_dispatch_yield_ms(),
        }
    }
}

impl Config {
    pub fn dispatch_yield(&self) -> Duration {
        Duration::from_millis(self.dispatch_yield_ms)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde(CONFIG_PATH).as_ref())
}

/// Reads the config at `path`, or at the default location. A missing file
/// yields the defaults.
pub fn read_config(path: Option<&Path>) -> Result<Config> {
    let path = path.map_or_else(default_config_path, Path::to_path_buf);

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    log::info!("Reading config file {}", path.display());
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config(Some(&dir.path().join("config.toml"))).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.dispatch_yield(), Duration::from_millis(10));
        assert_eq!(config.fallback_command, "riverctl");
    }

    #[test]
    fn values_are_read() {
        let file = config_file(
            r#"
logLevel = "debug"
fallbackCommand = "/usr/local/bin/riverctl"
dispatchYieldMs = 0
"#,
        );

        let config = read_config(Some(file.path())).unwrap();

        assert_eq!(
            config,
            Config {
                log_level: LevelFilter::Debug,
                fallback_command: "/usr/local/bin/riverctl".to_string(),
                dispatch_yield_ms: 0,
            }
        );
        assert!(config.dispatch_yield().is_zero());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = config_file("logLevel = \"info\"\n");

        let config = read_config(Some(file.path())).unwrap();

        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(config.fallback_command, "riverctl");
        assert_eq!(config.dispatch_yield_ms, 10);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let file = config_file("dispatchYieldMs = \"soon\"\n");
        assert!(read_config(Some(file.path())).is_err());
    }

    #[test]
    fn default_path_is_expanded() {
        let path = default_config_path();
        assert!(path.ends_with(".config/riverbridge/config.toml"));
        assert!(!path.starts_with("~"));
    }
}
