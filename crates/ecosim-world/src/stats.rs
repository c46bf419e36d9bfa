//! Per-cycle statistics and the persisted cycle log.
//!
//! The log is a semicolon-delimited text file: one header line, then one
//! record per reported cycle with the cycle number counted from 1.

use ecosim_core::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info, warn};

/// Header line of the persisted log
pub const LOG_HEADER: &str = "Time;Animals;Plants;Births;Deaths;Events";

/// Separator placed between events reported in the same cycle
pub const EVENT_SEPARATOR: &str = " / ";

/// Where the console driver writes its log unless told otherwise
pub fn default_log_path() -> PathBuf {
    Path::new("simulation_data").join("ecosystem_stats.csv")
}

/// One row of the persisted log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// Cycle number counted from 1
    pub time: u64,
    pub animals: usize,
    pub plants: usize,
    /// Cumulative births
    pub births: u64,
    /// Cumulative deaths
    pub deaths: u64,
    pub events: String,
}

impl CycleRecord {
    pub fn to_log_line(&self) -> String {
        format!(
            "{};{};{};{};{};{}",
            self.time, self.animals, self.plants, self.births, self.deaths, self.events
        )
    }

    /// Parse one record line (without its trailing newline)
    pub fn from_log_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.splitn(6, ';').collect();
        if fields.len() != 6 {
            return Err(Error::Serialization(format!(
                "expected 6 fields, found {}: {:?}",
                fields.len(),
                line
            )));
        }

        fn number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
            raw.parse()
                .map_err(|_| Error::Serialization(format!("invalid {} value: {:?}", name, raw)))
        }

        Ok(Self {
            time: number("Time", fields[0])?,
            animals: number("Animals", fields[1])?,
            plants: number("Plants", fields[2])?,
            births: number("Births", fields[3])?,
            deaths: number("Deaths", fields[4])?,
            events: fields[5].to_string(),
        })
    }
}

/// Read every record of a persisted log, checking its header
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<CycleRecord>> {
    let contents = fs::read_to_string(path)?;
    let mut lines = contents.lines();

    match lines.next() {
        Some(LOG_HEADER) => {}
        other => {
            return Err(Error::Serialization(format!(
                "unexpected log header: {:?}",
                other
            )))
        }
    }

    lines.map(CycleRecord::from_log_line).collect()
}

/// Live counters for display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Number of cycles reported so far
    pub cycles: u64,
    pub animals: usize,
    pub plants: usize,
    pub births: u64,
    pub deaths: u64,
}

struct LogFile {
    path: PathBuf,
    writer: LineWriter<File>,
}

impl LogFile {
    /// Create the parent directory and start the file over with the header
    fn create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = LineWriter::new(file);
        writeln!(writer, "{}", LOG_HEADER)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    fn append(&mut self, record: &CycleRecord) -> Result<()> {
        writeln!(self.writer, "{}", record.to_log_line())?;
        Ok(())
    }
}

/// Collects births, deaths and per-cycle events.
///
/// Counters are atomics so the display side can read them while the engine
/// thread updates them.
pub struct StatsSink {
    births: AtomicU64,
    deaths: AtomicU64,
    events: Mutex<Vec<String>>,
    last: RwLock<StatsSnapshot>,
    log_path: Option<PathBuf>,
    log: Mutex<Option<LogFile>>,
}

impl StatsSink {
    /// A sink that keeps counters only
    pub fn in_memory() -> Self {
        Self {
            births: AtomicU64::new(0),
            deaths: AtomicU64::new(0),
            events: Mutex::new(Vec::new()),
            last: RwLock::new(StatsSnapshot::default()),
            log_path: None,
            log: Mutex::new(None),
        }
    }

    /// A sink that also appends every cycle to the log at `path`.
    ///
    /// The file is truncated and given a fresh header. If it cannot be
    /// created the failure is logged and the sink keeps counting in memory.
    pub fn with_log(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut sink = Self::in_memory();
        sink.log = Mutex::new(open_log(&path));
        sink.log_path = Some(path);
        sink
    }

    pub fn record_birth(&self) {
        self.births.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_death(&self) {
        self.deaths.fetch_add(1, Ordering::Relaxed);
    }

    /// Queue an event for the current cycle's record
    pub fn record_event(&self, event: impl Into<String>) {
        // The log is semicolon-delimited; keep events inside their column.
        let event = event
            .into()
            .replace(|c: char| c == '\n' || c == '\r', " ")
            .replace(';', ",");
        self.events.lock().push(event);
    }

    pub fn births(&self) -> u64 {
        self.births.load(Ordering::Relaxed)
    }

    pub fn deaths(&self) -> u64 {
        self.deaths.load(Ordering::Relaxed)
    }

    /// Events queued since the last report
    pub fn pending_events(&self) -> String {
        self.events.lock().join(EVENT_SEPARATOR)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            births: self.births(),
            deaths: self.deaths(),
            ..*self.last.read()
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Close out a cycle.
    ///
    /// `cycle` is the engine's zero-based counter; the record shows it
    /// counted from 1. Queued events go into the record and are cleared. A
    /// failed write is logged and otherwise ignored.
    pub fn report_cycle(&self, cycle: u64, animals: usize, plants: usize) -> CycleRecord {
        let events = std::mem::take(&mut *self.events.lock()).join(EVENT_SEPARATOR);

        let record = CycleRecord {
            time: cycle + 1,
            animals,
            plants,
            births: self.births(),
            deaths: self.deaths(),
            events,
        };

        if let Some(log) = self.log.lock().as_mut() {
            if let Err(e) = log.append(&record) {
                error!(path = %log.path.display(), "Failed to write statistics record: {}", e);
            }
        }

        *self.last.write() = StatsSnapshot {
            cycles: record.time,
            animals,
            plants,
            births: record.births,
            deaths: record.deaths,
        };

        info!(
            event = "cycle_report",
            cycle = record.time,
            animals,
            plants,
            births = record.births,
            deaths = record.deaths,
            "Cycle {}: {} animals, {} plants, {} births, {} deaths",
            record.time,
            animals,
            plants,
            record.births,
            record.deaths
        );

        record
    }

    /// Zero all counters and start the log over
    pub fn reset(&self) {
        self.births.store(0, Ordering::Relaxed);
        self.deaths.store(0, Ordering::Relaxed);
        self.events.lock().clear();
        *self.last.write() = StatsSnapshot::default();

        if let Some(path) = &self.log_path {
            *self.log.lock() = open_log(path);
        }
    }
}

impl Default for StatsSink {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for StatsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsSink")
            .field("births", &self.births())
            .field("deaths", &self.deaths())
            .field("log_path", &self.log_path)
            .finish()
    }
}

fn open_log(path: &Path) -> Option<LogFile> {
    match LogFile::create(path) {
        Ok(log) => Some(log),
        Err(e) => {
            warn!(path = %path.display(), "Failed to initialize statistics log, keeping counters in memory: {}", e);
            None
        }
    }
}
