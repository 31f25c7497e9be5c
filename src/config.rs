use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DynoResult;
use crate::types::Vehicle;

/// Runtime configuration. Every field is optional in the JSON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynoConfig {
    /// Countdown ticks before recording starts
    pub countdown_ticks: u32,
    pub countdown_tick_ms: u64,
    /// Period of the redundant position poll
    pub poll_interval_ms: u64,
    pub feed_capacity: usize,
    pub store_dir: PathBuf,
    pub vehicle: Vehicle,
}

impl Default for DynoConfig {
    fn default() -> Self {
        Self {
            countdown_ticks: 3,
            countdown_tick_ms: 1000,
            poll_interval_ms: 100,
            feed_capacity: 512,
            store_dir: PathBuf::from("dyno_runs"),
            vehicle: Vehicle::default(),
        }
    }
}

impl DynoConfig {
    pub fn load(path: &Path) -> DynoResult<Self> {
        let json = fs::read_to_string(path)?;
        let config: DynoConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DynoResult<()> {
        Vehicle::new(self.vehicle.name.clone(), self.vehicle.mass_kg)?;
        Ok(())
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DynoConfig::default();
        assert_eq!(config.countdown_ticks, 3);
        assert_eq!(config.countdown_tick(), Duration::from_secs(1));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.vehicle, Vehicle::default());
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"vehicle": {{"mass": 1320, "name": "Coupe"}}, "poll_interval_ms": 250}}"#)
            .unwrap();

        let config = DynoConfig::load(file.path()).unwrap();
        assert_eq!(config.vehicle.mass_kg, 1320.0);
        assert_eq!(config.vehicle.name, "Coupe");
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.countdown_ticks, 3);
    }

    #[test]
    fn test_rejects_bad_mass() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"vehicle": {{"mass": 0, "name": "Ghost"}}}}"#).unwrap();
        assert!(DynoConfig::load(file.path()).is_err());
    }
}
