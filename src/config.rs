//! Simulation Configuration
//!
//! Settings shared by the scene and the replay recorder. Defaults match
//! the game's stock settings; a JSON file and `XMOTO_*` environment
//! variables can override them.

use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::warn;

use crate::replay::CURRENT_FORMAT;
use crate::scene::context::MAX_PARTICLES;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for [`SimConfig`].
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Simulation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Particle generation enabled
    pub allow_particles: bool,
    /// Live particle budget
    pub max_particles: usize,
    /// Directory holding `.rpl` files
    pub replay_dir: PathBuf,
    /// Format written by replay saves
    pub save_format: u8,
    /// Recorded states per second
    pub frame_rate: f32,
    /// Gravity magnitude the particle laws are tuned for
    pub world_gravity: f32,
    /// Seed of the deterministic generator
    pub rng_seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            allow_particles: true,
            max_particles: MAX_PARTICLES,
            replay_dir: PathBuf::from("Replays"),
            save_format: CURRENT_FORMAT,
            frame_rate: 25.0,
            world_gravity: 9.81,
            rng_seed: 0,
        }
    }
}

impl SimConfig {
    /// Load from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Defaults overridden by the environment.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `XMOTO_*` overrides read through `lookup`.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("XMOTO_REPLAY_DIR") {
            self.replay_dir = PathBuf::from(dir);
        }
        override_parsed(&lookup, "XMOTO_ALLOW_PARTICLES", &mut self.allow_particles);
        override_parsed(&lookup, "XMOTO_MAX_PARTICLES", &mut self.max_particles);
        override_parsed(&lookup, "XMOTO_RNG_SEED", &mut self.rng_seed);
        self
    }
}

fn override_parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    let Some(raw) = lookup(key) else { return };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!(key, value = %raw, "Ignoring invalid config override"),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert!(config.allow_particles);
        assert_eq!(config.max_particles, 512);
        assert_eq!(config.save_format, 3);
        assert_eq!(config.replay_dir, PathBuf::from("Replays"));
    }

    #[test]
    fn test_partial_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.json");
        std::fs::write(&path, r#"{ "max_particles": 64, "frame_rate": 50.0 }"#).unwrap();

        let config = SimConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_particles, 64);
        assert_eq!(config.frame_rate, 50.0);
        assert!(config.allow_particles);
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(SimConfig::from_json_file(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: BTreeMap<&str, &str> = [
            ("XMOTO_REPLAY_DIR", "/tmp/rpl"),
            ("XMOTO_ALLOW_PARTICLES", "false"),
            ("XMOTO_MAX_PARTICLES", "lots"),
            ("XMOTO_RNG_SEED", "42"),
        ]
        .into_iter()
        .collect();
        let config = SimConfig::default().with_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.replay_dir, PathBuf::from("/tmp/rpl"));
        assert!(!config.allow_particles);
        assert_eq!(config.max_particles, 512);
        assert_eq!(config.rng_seed, 42);
    }
}
