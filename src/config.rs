//! User settings.
//!
//! Read from `$XDG_CONFIG_HOME/ctxview/settings.json` (or `~/.config/...`).
//! Every field is optional; anything missing falls back to a default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
struct PersistedSettings {
    #[serde(default)]
    debounce_ms: Option<u64>,
    #[serde(default)]
    quick_context_lines: Option<u32>,
    #[serde(default)]
    full_context_lines: Option<u32>,
    #[serde(default)]
    image_tolerance_cells: Option<u16>,

    #[serde(default)]
    preview_cache_capacity: Option<usize>,
    #[serde(default)]
    diff_cache_capacity: Option<usize>,
    #[serde(default)]
    image_cache_capacity: Option<usize>,

    #[serde(default)]
    syntax_highlight: Option<bool>,
    #[serde(default)]
    watch: Option<bool>,
    #[serde(default)]
    show_hidden: Option<bool>,
}

/// Resolved settings, all fields concrete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub debounce: Duration,
    pub quick_context_lines: u32,
    pub full_context_lines: u32,
    pub image_tolerance: u16,
    /// `None` keeps the cache unbounded.
    pub preview_cache_capacity: Option<usize>,
    pub diff_cache_capacity: Option<usize>,
    pub image_cache_capacity: Option<usize>,
    pub syntax_highlight: bool,
    pub watch: bool,
    pub show_hidden: bool,
}

impl Default for Config {
    fn default() -> Self {
        PersistedSettings::default().resolve()
    }
}

impl PersistedSettings {
    fn resolve(self) -> Config {
        Config {
            debounce: Duration::from_millis(self.debounce_ms.unwrap_or(100)),
            quick_context_lines: self.quick_context_lines.unwrap_or(3),
            full_context_lines: self.full_context_lines.unwrap_or(100_000),
            image_tolerance: self.image_tolerance_cells.unwrap_or(5),
            preview_cache_capacity: self.preview_cache_capacity,
            diff_cache_capacity: self.diff_cache_capacity,
            image_cache_capacity: self.image_cache_capacity,
            syntax_highlight: self.syntax_highlight.unwrap_or(true),
            watch: self.watch.unwrap_or(true),
            show_hidden: self.show_hidden.unwrap_or(false),
        }
    }
}

fn settings_file_path() -> Option<PathBuf> {
    let home = env::home_dir()?;
    let base = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join(".config"));
    Some(base.join("ctxview").join("settings.json"))
}

/// Load settings; a missing file is silent, a malformed one is logged and ignored.
pub fn load() -> Config {
    match settings_file_path() {
        Some(path) => load_from(&path),
        None => Config::default(),
    }
}

fn load_from(path: &Path) -> Config {
    let Ok(data) = fs::read_to_string(path) else {
        return Config::default();
    };
    match serde_json::from_str::<PersistedSettings>(&data) {
        Ok(settings) => {
            let config = settings.resolve();
            log::info!("config: loaded {} -> {:?}", path.display(), config);
            config
        }
        Err(e) => {
            log::warn!("config: ignoring {}: {}", path.display(), e);
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.debounce, Duration::from_millis(100));
        assert_eq!(config.quick_context_lines, 3);
        assert_eq!(config.image_tolerance, 5);
        assert_eq!(config.diff_cache_capacity, None);
        assert!(config.syntax_highlight);
        assert!(config.watch);
    }

    #[test]
    fn test_partial_file_overrides_some_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"debounce_ms": 250, "image_cache_capacity": 32}"#).unwrap();
        let config = load_from(&path);
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.image_cache_capacity, Some(32));
        assert_eq!(config.quick_context_lines, 3);
    }

    #[test]
    fn test_malformed_or_missing_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(load_from(&path), Config::default());
        fs::write(&path, "{not json").unwrap();
        assert_eq!(load_from(&path), Config::default());
    }
}
