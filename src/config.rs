//! Frontend-level (ambient) configuration, loaded from an optional JSON
//! file. The core never reads this; only `src/bin/gb_rs.rs` does.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Key bindings map a `minifb::Key` name (as text, so the config file stays
/// backend-agnostic) to one of the eight joypad lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyBindings {
    pub up: String,
    pub down: String,
    pub left: String,
    pub right: String,
    pub a: String,
    pub b: String,
    pub start: String,
    pub select: String,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            up: "Up".into(),
            down: "Down".into(),
            left: "Left".into(),
            right: "Right".into(),
            a: "X".into(),
            b: "Z".into(),
            start: "Return".into(),
            select: "RightShift".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub boot_rom: Option<PathBuf>,
    #[serde(default)]
    pub keys: KeyBindings,
    /// Stop after this many frames instead of running indefinitely; used by
    /// headless test-ROM runs.
    #[serde(default)]
    pub frame_limit: Option<u64>,
}

impl Config {
    /// Loads `path` if it exists, otherwise returns the defaults. A present
    /// but malformed file is an error rather than a silent fallback.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
        serde_json::from_str(&text).map_err(|e| format!("{}: {e}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load("/nonexistent/path/gb_rs.json").unwrap();
        assert_eq!(cfg.keys.a, "X");
        assert!(cfg.boot_rom.is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = Config::default();
        let text = serde_json::to_string(&cfg).unwrap();
        let parsed: Config = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.keys.start, cfg.keys.start);
    }
}
