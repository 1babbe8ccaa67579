use crate::checkpoint::DEFAULT_CHECKPOINT_INTERVAL;
use crate::engine::EngineSettings;
use crate::metrics::{WpmModel, WpmSettings};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub owner_id: String,
    pub checkpoint_interval: usize,
    pub wpm_model: WpmModel,
    pub wpm_window_secs: u64,
    pub wpm_min_keystrokes: usize,
    pub average_refresh_ms: u64,
    pub tick_rate_ms: u64,
    pub db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner_id: default_owner(),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            wpm_model: WpmModel::SlidingWindow,
            wpm_window_secs: 10,
            wpm_min_keystrokes: 5,
            average_refresh_ms: 1000,
            tick_rate_ms: 100,
            db_path: None,
        }
    }
}

fn default_owner() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "local".to_string())
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            wpm: WpmSettings {
                model: self.wpm_model,
                window: Duration::from_secs(self.wpm_window_secs),
                min_keystrokes: self.wpm_min_keystrokes,
                refresh: Duration::from_millis(self.average_refresh_ms.max(1)),
            },
            checkpoint_interval: self.checkpoint_interval.max(1),
        }
    }

    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms.max(1))
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "typebook") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("typebook_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            if let Ok(cfg) = serde_json::from_slice::<Config>(&bytes) {
                return cfg;
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            owner_id: "reader".into(),
            checkpoint_interval: 250,
            wpm_model: WpmModel::SessionAverage,
            wpm_window_secs: 15,
            wpm_min_keystrokes: 8,
            average_refresh_ms: 500,
            tick_rate_ms: 50,
            db_path: Some(dir.path().join("books.db")),
        };
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn missing_or_corrupt_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        assert_eq!(store.load(), Config::default());

        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{"checkpoint_interval": 40}"#).unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.checkpoint_interval, 40);
        assert_eq!(cfg.wpm_model, WpmModel::SlidingWindow);
    }

    #[test]
    fn engine_settings_from_config() {
        let cfg = Config {
            wpm_model: WpmModel::SessionAverage,
            checkpoint_interval: 0,
            ..Config::default()
        };
        let settings = cfg.engine_settings();

        assert_eq!(settings.wpm.model, WpmModel::SessionAverage);
        assert_eq!(settings.wpm.window, Duration::from_secs(10));
        assert_eq!(settings.checkpoint_interval, 1);
    }
}
