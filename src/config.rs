//! YAML configuration: the face→project mapping, the Hackaru endpoint, and
//! the cube's BLE address.
//!
//! The config is immutable and loaded exactly once at startup. Any validation
//! failure is fatal — the daemon refuses to start rather than run with a
//! mapping it cannot trust.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Faces a Timeular cube can report. 0 means "flat / in motion".
pub const FACE_RANGE: std::ops::RangeInclusive<u8> = 1..=8;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ─── Config schema ───────────────────────────────────────────────────────────

/// One face→activity mapping entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingEntry {
    /// Cube face, 1–8.
    pub face: u8,
    /// Hackaru project id the face starts.
    pub project: i64,
    /// Activity description sent on start. When empty or absent, the daemon
    /// prompts for one interactively before starting.
    #[serde(default)]
    pub description: String,
    /// Optional human-readable project name — informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `[cube]` section — the peripheral to connect to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CubeConfig {
    /// BLE MAC address of the cube, `AA:BB:CC:DD:EE:FF` (uppercase hex).
    pub address: String,
}

/// `[hackaru]` section — the tracking service account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HackaruConfig {
    /// Base URL of the Hackaru server, e.g. `https://api.hackaru.app`.
    pub endpoint: String,
    /// Login email. The password is prompted interactively and never stored.
    pub email: String,
}

/// The whole config file (`config.yml` in the data directory by default).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub cube: CubeConfig,
    pub hackaru: HackaruConfig,
    /// Face→project mapping. Faces must be unique; faces not listed are
    /// unmapped and only ever stop the running activity.
    pub mapping: Vec<MappingEntry>,
}

impl Config {
    /// Load and validate the config file. Every error here is fatal to
    /// startup.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the rest of the daemon relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let addr_re = Regex::new(r"^([0-9A-F]{2}:){5}[0-9A-F]{2}$").expect("static regex");
        if !addr_re.is_match(&self.cube.address) {
            return Err(ConfigError::Invalid(format!(
                "cube.address '{}' is not a MAC address (AA:BB:CC:DD:EE:FF, uppercase)",
                self.cube.address
            )));
        }

        if !self.hackaru.endpoint.starts_with("http") {
            return Err(ConfigError::Invalid(format!(
                "hackaru.endpoint '{}' is not an http(s) URL",
                self.hackaru.endpoint
            )));
        }
        if self.hackaru.email.is_empty() {
            return Err(ConfigError::Invalid("hackaru.email is empty".into()));
        }

        let mut seen = [false; 9];
        for entry in &self.mapping {
            if !FACE_RANGE.contains(&entry.face) {
                return Err(ConfigError::Invalid(format!(
                    "mapping face {} is out of range 1..=8",
                    entry.face
                )));
            }
            if seen[entry.face as usize] {
                return Err(ConfigError::Invalid(format!(
                    "mapping face {} appears more than once",
                    entry.face
                )));
            }
            seen[entry.face as usize] = true;
        }
        Ok(())
    }

    /// Base URL of the activities API.
    pub fn endpoint(&self) -> &str {
        self.hackaru.endpoint.trim_end_matches('/')
    }
}

/// Default data directory: `$XDG_DATA_HOME/cubelink`, `~/.local/share/cubelink`,
/// `~/Library/Application Support/cubelink`, or `%APPDATA%\cubelink`.
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("cubelink");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("cubelink");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("cubelink");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("cubelink");
        }
    }
    // Fallback
    PathBuf::from(".cubelink")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_yaml() -> &'static str {
        r#"
cube:
  address: "C7:E7:00:12:AB:CD"
hackaru:
  endpoint: https://hackaru.example.com
  email: me@example.com
mapping:
  - face: 3
    project: 7
    description: writing
  - face: 5
    project: 12
"#
    }

    #[test]
    fn parses_and_validates_valid_config() {
        let config: Config = serde_yaml::from_str(valid_yaml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.mapping.len(), 2);
        assert_eq!(config.mapping[0].face, 3);
        assert_eq!(config.mapping[0].project, 7);
        assert_eq!(config.mapping[0].description, "writing");
        // face 5 has no description — prompted at start time
        assert_eq!(config.mapping[1].face, 5);
        assert_eq!(config.mapping[1].description, "");
    }

    #[test]
    fn rejects_bad_device_address() {
        let mut config: Config = serde_yaml::from_str(valid_yaml()).unwrap();
        config.cube.address = "not-a-mac".into();
        assert!(config.validate().is_err());
        // lowercase hex is rejected too — addresses are normalized upstream
        config.cube.address = "c7:e7:00:12:ab:cd".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_face() {
        let mut config: Config = serde_yaml::from_str(valid_yaml()).unwrap();
        config.mapping[0].face = 9;
        assert!(config.validate().is_err());
        config.mapping[0].face = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_face() {
        let mut config: Config = serde_yaml::from_str(valid_yaml()).unwrap();
        config.mapping[1].face = config.mapping[0].face;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let mut config: Config = serde_yaml::from_str(valid_yaml()).unwrap();
        config.hackaru.endpoint = "ftp://hackaru.example.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let mut config: Config = serde_yaml::from_str(valid_yaml()).unwrap();
        config.hackaru.endpoint = "https://hackaru.example.com/".into();
        assert_eq!(config.endpoint(), "https://hackaru.example.com");
    }
}
