use log::warn;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{DynoError, DynoResult};
use crate::types::TestRun;

/// Name of the saved-run collection
pub const SAVED_TESTS_KEY: &str = "dyno-saved-tests";

/// Durable storage of the saved-run collection, newest first
pub trait RunRepository {
    fn load(&self) -> DynoResult<Vec<TestRun>>;
    fn store(&mut self, runs: &[TestRun]) -> DynoResult<()>;
}

/// Read the collection, falling back to empty on any failure
pub fn load_or_empty<R: RunRepository + ?Sized>(repository: &R) -> Vec<TestRun> {
    match repository.load() {
        Ok(runs) => runs,
        Err(e) => {
            warn!("[store] could not read saved runs, starting empty: {}", e);
            Vec::new()
        }
    }
}

/// Collection stored as one JSON file named after the collection key
#[derive(Clone, Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(format!("{}.json", SAVED_TESTS_KEY)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunRepository for JsonFileRepository {
    fn load(&self) -> DynoResult<Vec<TestRun>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn store(&mut self, runs: &[TestRun]) -> DynoResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(runs)?;

        // Write then rename so a crash never leaves a truncated collection
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory repository. Clones share the same collection.
#[derive(Clone, Debug, Default)]
pub struct MemoryRepository {
    runs: Arc<Mutex<Vec<TestRun>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runs(runs: Vec<TestRun>) -> Self {
        Self {
            runs: Arc::new(Mutex::new(runs)),
            fail_writes: Arc::new(Mutex::new(false)),
        }
    }

    /// Make subsequent writes fail with a storage error
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.lock() {
            *flag = fail;
        }
    }

    pub fn snapshot(&self) -> Vec<TestRun> {
        self.runs.lock().map(|runs| runs.clone()).unwrap_or_default()
    }
}

impl RunRepository for MemoryRepository {
    fn load(&self) -> DynoResult<Vec<TestRun>> {
        let runs = self
            .runs
            .lock()
            .map_err(|_| DynoError::Internal("Failed to acquire repository lock".to_string()))?;
        Ok(runs.clone())
    }

    fn store(&mut self, runs: &[TestRun]) -> DynoResult<()> {
        let fail = self
            .fail_writes
            .lock()
            .map(|flag| *flag)
            .map_err(|_| DynoError::Internal("Failed to acquire repository lock".to_string()))?;
        if fail {
            return Err(DynoError::Storage("write rejected".to_string()));
        }

        let mut stored = self
            .runs
            .lock()
            .map_err(|_| DynoError::Internal("Failed to acquire repository lock".to_string()))?;
        *stored = runs.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DerivedPoint, Vehicle};

    fn sample_run(id: &str) -> TestRun {
        TestRun {
            id: id.to_string(),
            vehicle: Vehicle::new("Wagon", 1720.0).unwrap(),
            date: "2025-11-19T12:00:00.000Z".to_string(),
            max_power_hp: 143.2,
            max_torque_nm: 512.9,
            data: vec![
                DerivedPoint {
                    power_hp: 98.1,
                    torque_nm: 512.9,
                    speed_kmh: 41.4,
                    elapsed_seconds: 1.1,
                },
                DerivedPoint {
                    power_hp: 143.2,
                    torque_nm: 377.0,
                    speed_kmh: 63.0,
                    elapsed_seconds: 2.3,
                },
            ],
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::in_dir(dir.path());
        assert!(repo.load().unwrap().is_empty());
        assert!(repo.path().ends_with("dyno-saved-tests.json"));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = JsonFileRepository::in_dir(&dir.path().join("nested"));
        let runs = vec![sample_run("b"), sample_run("a")];

        repo.store(&runs).unwrap();
        let back = JsonFileRepository::in_dir(&dir.path().join("nested"))
            .load()
            .unwrap();
        assert_eq!(back, runs);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::in_dir(dir.path());
        std::fs::write(repo.path(), "{not json").unwrap();

        assert!(repo.load().is_err());
        assert!(load_or_empty(&repo).is_empty());
    }

    #[test]
    fn test_memory_failing_writes() {
        let mut repo = MemoryRepository::with_runs(vec![sample_run("a")]);
        repo.set_fail_writes(true);
        assert!(matches!(
            repo.store(&[sample_run("b")]),
            Err(DynoError::Storage(_))
        ));
        assert_eq!(repo.snapshot().len(), 1);
        assert_eq!(repo.snapshot()[0].id, "a");
    }
}
