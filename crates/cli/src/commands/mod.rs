//! Subcommand implementations.

pub mod config;
pub mod context;
pub mod doctor;
pub mod prompt;
pub mod save;
pub mod search;
pub mod templates;

use hearth_config::AppConfig;
use hearth_orchestrator::MemoryOrchestrator;
use std::path::PathBuf;

/// Flags shared by every subcommand.
pub struct Global {
    pub config: Option<PathBuf>,
    pub offline: bool,
    pub json: bool,
}

impl Global {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
    }

    /// Configuration with environment overrides applied.
    pub fn load_config(&self) -> Result<AppConfig, Box<dyn std::error::Error>> {
        let path = self.config_path();
        AppConfig::load_with_env(&path).map_err(|e| format!("Failed to load config: {e}").into())
    }

    pub fn orchestrator(&self) -> Result<MemoryOrchestrator, Box<dyn std::error::Error>> {
        let config = self.load_config()?;
        Ok(MemoryOrchestrator::from_config(&config, self.offline)?)
    }
}

/// Print `value` as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("mañana por la tarde", 6), "mañana…");
    }

    #[test]
    fn explicit_config_path_wins() {
        let global = Global {
            config: Some(PathBuf::from("/tmp/hearth-test.toml")),
            offline: true,
            json: false,
        };
        assert_eq!(global.config_path(), PathBuf::from("/tmp/hearth-test.toml"));
    }

    #[test]
    fn loads_file_and_builds_offline_orchestrator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[prompt]\nassistant_name = \"Abuela\"\n").unwrap();
        let global = Global {
            config: Some(path),
            offline: true,
            json: false,
        };
        let config = global.load_config().unwrap();
        assert_eq!(config.prompt.assistant_name, "Abuela");
        assert!(global.orchestrator().is_ok());
    }
}
