//! Window preferences stored as plain `key: value` lines.
//!
//! ```text
//! width: 720
//! height: 480
//! x: -1
//! y: -1
//! fullscreen: false
//! refreshRate: 60
//! vsync: true
//! ```
//!
//! Keys are case-insensitive and unknown keys are skipped. A position of
//! `-1` lets the platform place the window.

use std::fmt;
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrefsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: invalid value {value:?} for `{key}`")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GamePreferences {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub fullscreen: bool,
    pub refresh_rate: u32,
    pub vsync: bool,
}

impl GamePreferences {
    pub const DEFAULT_PATH: &'static str = "res/gameprefs.txt";

    /// Parse preferences text. Keys missing from the text keep their defaults.
    pub fn parse(text: &str) -> Result<Self, PrefsError> {
        let mut prefs = Self::default();
        for (index, raw) in text.lines().enumerate() {
            let Some((key, value)) = raw.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().trim_matches('\u{a0}');
            let invalid = || PrefsError::InvalidValue {
                line: index + 1,
                key: key.clone(),
                value: value.to_string(),
            };
            match key.as_str() {
                "width" => prefs.width = value.parse().map_err(|_| invalid())?,
                "height" => prefs.height = value.parse().map_err(|_| invalid())?,
                "x" => prefs.x = value.parse().map_err(|_| invalid())?,
                "y" => prefs.y = value.parse().map_err(|_| invalid())?,
                "fullscreen" => prefs.fullscreen = parse_bool(value).ok_or_else(invalid)?,
                "refreshrate" => prefs.refresh_rate = value.parse().map_err(|_| invalid())?,
                "vsync" => prefs.vsync = parse_bool(value).ok_or_else(invalid)?,
                other => log::debug!("ignoring unknown preference `{other}`"),
            }
        }
        Ok(prefs)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PrefsError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Load from `path`, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(prefs) => prefs,
            Err(e) => {
                log::warn!("Failed to read preferences '{}': {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PrefsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_string())?;
        Ok(())
    }

    /// Whether the window position was set explicitly.
    pub fn has_position(&self) -> bool {
        self.x >= 0 && self.y >= 0
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl Default for GamePreferences {
    fn default() -> Self {
        Self {
            width: 720,
            height: 480,
            x: -1,
            y: -1,
            fullscreen: false,
            refresh_rate: 60,
            vsync: true,
        }
    }
}

impl fmt::Display for GamePreferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "width: {}", self.width)?;
        writeln!(f, "height: {}", self.height)?;
        writeln!(f, "x: {}", self.x)?;
        writeln!(f, "y: {}", self.y)?;
        writeln!(f, "fullscreen: {}", self.fullscreen)?;
        writeln!(f, "refreshRate: {}", self.refresh_rate)?;
        write!(f, "vsync: {}", self.vsync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive_and_keeps_defaults() {
        let prefs = GamePreferences::parse("WIDTH: 1280\nRefreshRate : 144\nvsync: FALSE\n").unwrap();
        assert_eq!(prefs.width, 1280);
        assert_eq!(prefs.refresh_rate, 144);
        assert!(!prefs.vsync);
        assert_eq!(prefs.height, 480);
        assert_eq!(prefs.x, -1);
    }

    #[test]
    fn unknown_keys_and_blank_lines_are_skipped() {
        let prefs = GamePreferences::parse("\ntheme: dark\nfullscreen: true\n").unwrap();
        assert!(prefs.fullscreen);
    }

    #[test]
    fn malformed_value_reports_line() {
        let err = GamePreferences::parse("width: 10\nheight: tall\n").unwrap_err();
        match err {
            PrefsError::InvalidValue { line, key, .. } => {
                assert_eq!(line, 2);
                assert_eq!(key, "height");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn display_parses_back() {
        let prefs = GamePreferences {
            width: 1920,
            height: 1080,
            x: 10,
            y: 20,
            fullscreen: true,
            refresh_rate: 75,
            vsync: false,
        };
        assert_eq!(GamePreferences::parse(&prefs.to_string()).unwrap(), prefs);
    }

    #[test]
    fn save_and_load_file() {
        let path = std::env::temp_dir().join(format!("tessera-prefs-{}.txt", std::process::id()));
        let prefs = GamePreferences { width: 800, ..Default::default() };
        prefs.save(&path).unwrap();
        assert_eq!(GamePreferences::load_or_default(&path), prefs);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("tessera-prefs-does-not-exist.txt");
        assert_eq!(GamePreferences::load_or_default(path), GamePreferences::default());
    }
}
