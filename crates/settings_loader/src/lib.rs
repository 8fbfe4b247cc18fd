//! # Settings Loader
//!
//! Centralized loading of the planner's optional `settings.json`: the
//! default-yield override and the trailing window used when summing local
//! dividend records. Missing files fall back to the built-in defaults so a
//! fresh checkout runs without any configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use models::Settings;

/// Loads settings from a JSON file
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Reading settings file: {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing settings JSON in {}", path.display()))?;
    Ok(settings)
}

/// Loads settings from a default location (settings.json in the current directory)
pub fn load_default_settings() -> Result<Settings> {
    load_settings("settings.json")
}

/// Loads settings from an optional path, falling back to defaults when no
/// path is given
pub fn load_optional_settings(path: Option<&PathBuf>) -> Result<Settings> {
    match path {
        Some(settings_path) => load_settings(settings_path),
        None => Ok(Settings::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_settings_parses_overrides() {
        let dir = std::env::temp_dir();
        let path = dir.join("planner_settings_loader_test.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"settings_version": 1, "default_average_yield": "7.25", "dividend_window_days": 180}}"#
        )
        .unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.dividend_window_days, 180);
        assert!(settings.default_average_yield.is_some());

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_optional_settings_defaults_without_path() {
        let settings = load_optional_settings(None).unwrap();
        assert_eq!(settings.dividend_window_days, 365);
        assert_eq!(settings.default_average_yield, None);
    }
}
