//! On-disk artefacts of a run: checkpoint, flux-threshold snapshots and the
//! final integration result. All files are JSON and are written to a
//! temporary sibling first, then renamed into place.
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{LemError, LemResult};
use crate::integrate::IntegrationResult;
use crate::observer::ObserverState;
use crate::params::ModelConfig;

/// Everything needed to resume a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub t: f64,
    pub state: Vec<f64>,
    pub model: ModelConfig,
    pub observer: ObserverState,
}

/// State captured when the flux fraction crosses an output threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSnapshot {
    pub t: f64,
    pub state: Vec<f64>,
}

/// File naming for one run: `<dir>/<run_name>_*.p`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStore {
    dir: PathBuf,
    run_name: String,
}

impl RunStore {
    pub fn new(dir: impl Into<PathBuf>, run_name: impl Into<String>) -> Self {
        Self { dir: dir.into(), run_name: run_name.into() }
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(format!("{}_checkpoint.p", self.run_name))
    }

    /// Snapshot path labelled with a flux fraction to one decimal.
    pub fn output_path(&self, flux_label: f64) -> PathBuf {
        self.dir.join(format!("{}_{:.1}.p", self.run_name, flux_label))
    }

    pub fn results_path(&self) -> PathBuf {
        self.dir.join(format!("{}_results.p", self.run_name))
    }

    /// Overwrites the previous checkpoint atomically.
    pub fn write_checkpoint(&self, record: &CheckpointRecord) -> LemResult<PathBuf> {
        let path = self.checkpoint_path();
        write_json_atomic(&path, record)?;
        Ok(path)
    }

    pub fn load_checkpoint(&self) -> LemResult<CheckpointRecord> {
        let record: CheckpointRecord = read_json(&self.checkpoint_path())?;
        record.model.shape.check_len("checkpoint state", record.state.len())?;
        Ok(record)
    }

    /// Snapshots are write-once; an existing file with the same label is an
    /// error.
    pub fn write_output(&self, flux_label: f64, snapshot: &OutputSnapshot) -> LemResult<PathBuf> {
        let path = self.output_path(flux_label);
        if path.exists() {
            return Err(LemError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "snapshot already written"),
            ));
        }
        write_json_atomic(&path, snapshot)?;
        Ok(path)
    }

    pub fn load_output(&self, flux_label: f64) -> LemResult<OutputSnapshot> {
        read_json(&self.output_path(flux_label))
    }

    pub fn write_results(&self, result: &IntegrationResult) -> LemResult<PathBuf> {
        let path = self.results_path();
        write_json_atomic(&path, result)?;
        Ok(path)
    }

    pub fn load_results(&self) -> LemResult<IntegrationResult> {
        read_json(&self.results_path())
    }
}

/// Serialize `value` to `<path>.tmp`, sync, then rename over `path`. An
/// interrupted write leaves any previous file at `path` intact.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> LemResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| LemError::io(parent, e))?;
        }
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let file = File::create(&tmp).map_err(|e| LemError::io(&tmp, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .map_err(|e| LemError::Serialization { path: tmp.clone(), source: e })?;
    writer.flush().map_err(|e| LemError::io(&tmp, e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| LemError::io(&tmp, e))?;
    drop(writer);

    fs::rename(&tmp, path).map_err(|e| LemError::io(path, e))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> LemResult<T> {
    let file = File::open(path).map_err(|e| LemError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| LemError::Serialization { path: path.to_path_buf(), source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::RoutingOptions;
    use crate::grid::GridShape;
    use crate::params::StreamPowerParams;

    fn record(t: f64) -> CheckpointRecord {
        CheckpointRecord {
            t,
            state: vec![0.0, 1.5, 2.25, 0.0, 0.0, 0.0],
            model: ModelConfig {
                shape: GridShape { ny: 3, nx: 2 },
                dx: 10.0,
                stream_power: StreamPowerParams::default(),
                routing: RoutingOptions::default(),
                renoise: Some(1e-4),
                seed: 7,
            },
            observer: ObserverState::default(),
        }
    }

    #[test]
    fn file_names_follow_run_name() {
        let store = RunStore::new("/data", "conc_01");
        assert_eq!(store.checkpoint_path(), PathBuf::from("/data/conc_01_checkpoint.p"));
        assert_eq!(store.output_path(0.30000000000000004), PathBuf::from("/data/conc_01_0.3.p"));
        assert_eq!(store.results_path(), PathBuf::from("/data/conc_01_results.p"));
    }

    #[test]
    fn checkpoint_is_replaced_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "run");
        store.write_checkpoint(&record(1.0)).unwrap();
        store.write_checkpoint(&record(2.0)).unwrap();
        let loaded = store.load_checkpoint().unwrap();
        assert_eq!(loaded, record(2.0));
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn checkpoint_with_wrong_state_length_is_a_shape_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "run");
        let mut bad = record(1.0);
        bad.state.pop();
        store.write_checkpoint(&bad).unwrap();
        assert!(matches!(store.load_checkpoint(), Err(LemError::Shape { .. })));
    }

    #[test]
    fn snapshots_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "run");
        let snap = OutputSnapshot { t: 5.0, state: vec![1.0, 2.0] };
        store.write_output(0.1, &snap).unwrap();
        let again = OutputSnapshot { t: 6.0, state: vec![3.0, 4.0] };
        assert!(store.write_output(0.1, &again).is_err());
        assert_eq!(store.load_output(0.1).unwrap(), snap);
    }

    #[test]
    fn missing_checkpoint_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "absent");
        assert!(matches!(store.load_checkpoint(), Err(LemError::Io { .. })));
    }
}
