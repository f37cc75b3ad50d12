use super::{History, Observation};
use crate::market::Underlying;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::debug;

const SERIES_HEADER: [&str; 6] = [
    "timestamp",
    "long_avg",
    "short_avg",
    "index_change",
    "short_vs_long_diff_prozent",
    "volatility_change",
];
const LIGHT_LOG: &str = "log_ampel.csv";
const INDEX_LOG: &str = "log_index.csv";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("series io failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("series csv malformed in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Flat CSV file per underlying (`hebel_<slug>.csv`).
///
/// Files are replaced by renaming a finished temp file over them, so readers
/// see either the old or the new series. Clones share the writer lock.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    dir: PathBuf,
    writer: Arc<Mutex<()>>,
}

impl SeriesStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: Arc::new(Mutex::new(())),
        }
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, underlying: Underlying) -> PathBuf {
        self.dir.join(format!("hebel_{}.csv", underlying.slug()))
    }

    /// Loads the stored series; a missing file is an empty history.
    pub fn load(&self, underlying: Underlying) -> Result<History, StoreError> {
        let path = self.path(underlying);
        if !path.exists() {
            return Ok(History::new());
        }
        Self::load_path(&path)
    }

    /// Reads a series file written by this store or by an older export.
    pub fn load_path(path: &Path) -> Result<History, StoreError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| StoreError::csv(path, source))?;

        let mut rows = Vec::new();
        for record in reader.deserialize::<Observation>() {
            rows.push(record.map_err(|source| StoreError::csv(path, source))?);
        }

        Ok(History::from_rows(rows))
    }

    /// Appends one observation, trimming the file to [`History::CAPACITY`] rows.
    pub fn append(
        &self,
        underlying: Underlying,
        observation: Observation,
    ) -> Result<History, StoreError> {
        let _writer = self.lock_writer();
        let mut history = self.load(underlying)?;
        history.push(observation);
        self.write(underlying, &history)?;
        debug!(%underlying, rows = history.len(), "series appended");
        Ok(history)
    }

    /// Callers hold the writer lock.
    fn write(&self, underlying: Underlying, history: &History) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::io(&self.dir, source))?;
        let path = self.path(underlying);
        let staging = NamedTempFile::new_in(&self.dir).map_err(|source| StoreError::io(&self.dir, source))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(staging);

        writer
            .write_record(SERIES_HEADER)
            .map_err(|source| StoreError::csv(&path, source))?;
        for row in history.rows() {
            writer
                .serialize(row)
                .map_err(|source| StoreError::csv(&path, source))?;
        }

        let staging = writer
            .into_inner()
            .map_err(|err| StoreError::io(&path, err.into_error()))?;
        staging
            .persist(&path)
            .map_err(|err| StoreError::io(&path, err.error))?;
        Ok(())
    }

    /// Empties every underlying's series and drops both audit logs.
    pub fn reset(&self) -> Result<(), StoreError> {
        let _writer = self.lock_writer();
        for underlying in Underlying::ALL {
            self.write(underlying, &History::new())?;
        }

        for name in [LIGHT_LOG, INDEX_LOG] {
            let path = self.dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(StoreError::io(&path, source)),
            }
        }

        Ok(())
    }
}

/// Row of `log_ampel.csv`.
#[derive(Debug, Clone, Serialize)]
pub struct LightLogEntry {
    #[serde(with = "super::timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub delta_long: f64,
    pub delta_short: f64,
    pub ampel: String,
    pub kommentar: String,
}

#[derive(Debug, Serialize)]
struct IndexLogEntry {
    #[serde(with = "super::timestamp_format")]
    timestamp: NaiveDateTime,
    index_change: f64,
}

/// Append-only audit trail of trend-light verdicts and index readings.
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_light(&self, entry: &LightLogEntry) -> Result<(), StoreError> {
        self.append(LIGHT_LOG, entry)
    }

    pub fn record_index(&self, timestamp: NaiveDateTime, index_change: f64) -> Result<(), StoreError> {
        self.append(
            INDEX_LOG,
            &IndexLogEntry {
                timestamp,
                index_change,
            },
        )
    }

    fn append<T: Serialize>(&self, name: &str, row: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::io(&self.dir, source))?;
        let path = self.dir.join(name);
        let fresh = !path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::io(&path, source))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(fresh)
            .from_writer(file);
        writer
            .serialize(row)
            .map_err(|source| StoreError::csv(&path, source))?;
        writer.flush().map_err(|source| StoreError::io(&path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::fixtures::start;
    use chrono::Duration;

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SeriesStore::new(dir.path());
        let history = store.load(Underlying::Nasdaq).expect("load succeeds");
        assert!(history.is_empty());
    }

    #[test]
    fn append_persists_rows_with_optional_columns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SeriesStore::new(dir.path());

        store
            .append(Underlying::Dax, Observation::new(start(), 10.0, 12.0, 0.3, None))
            .expect("first append");
        store
            .append(
                Underlying::Dax,
                Observation::new(start() + Duration::seconds(5), 10.5, 11.0, 0.4, Some(-1.2)),
            )
            .expect("second append");

        let history = store.load(Underlying::Dax).expect("reload");
        assert_eq!(history.len(), 2);
        assert_eq!(history.rows()[0].volatility_change, None);
        assert_eq!(history.rows()[1].volatility_change, Some(-1.2));
        assert_eq!(history.rows()[1].timestamp, start() + Duration::seconds(5));

        let raw = fs::read_to_string(store.path(Underlying::Dax)).expect("file readable");
        assert!(raw.starts_with("timestamp,long_avg,short_avg,index_change"));
    }

    #[test]
    fn loads_never_see_a_partial_rewrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SeriesStore::new(dir.path());
        let full = History::from_rows(
            (0..History::CAPACITY)
                .map(|i| Observation::new(start() + Duration::seconds(i as i64), 10.0, 12.0, 0.1, Some(0.5)))
                .collect(),
        );
        store.write(Underlying::Dax, &full).expect("seed");
        let seeded_last = start() + Duration::seconds(History::CAPACITY as i64 - 1);

        std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                for i in 0..300 {
                    let at = seeded_last + Duration::seconds(i + 1);
                    store
                        .append(Underlying::Dax, Observation::new(at, 10.0, 12.0, 0.1, None))
                        .expect("append");
                }
            });

            let mut newest = seeded_last;
            while !writer.is_finished() {
                let history = store.load(Underlying::Dax).expect("consistent read");
                assert_eq!(history.len(), History::CAPACITY);
                let last = history.last().expect("rows").timestamp;
                assert!(last >= newest, "series went backwards");
                newest = last;
            }
            writer.join().expect("writer thread");
        });

        let history = store.load(Underlying::Dax).expect("final read");
        assert_eq!(
            history.last().map(|row| row.timestamp),
            Some(seeded_last + Duration::seconds(300))
        );
    }

    #[test]
    fn reset_clears_series_and_logs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SeriesStore::new(dir.path());
        let audit = AuditLog::new(dir.path());

        store
            .append(Underlying::Sp500, Observation::new(start(), 3.0, 4.0, 0.1, None))
            .expect("append");
        audit.record_index(start(), 0.1).expect("index log");

        store.reset().expect("reset");

        assert!(store.load(Underlying::Sp500).expect("reload").is_empty());
        assert!(store.path(Underlying::Nasdaq).exists());
        assert!(!dir.path().join(INDEX_LOG).exists());
    }

    #[test]
    fn audit_log_writes_header_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audit = AuditLog::new(dir.path());
        let entry = LightLogEntry {
            timestamp: start(),
            delta_long: 1.5,
            delta_short: -2.0,
            ampel: "red".to_string(),
            kommentar: "crash alarm".to_string(),
        };

        audit.record_light(&entry).expect("first");
        audit.record_light(&entry).expect("second");

        let raw = fs::read_to_string(dir.path().join(LIGHT_LOG)).expect("log readable");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,delta_long,delta_short,ampel,kommentar");
    }
}
