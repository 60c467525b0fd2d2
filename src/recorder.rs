//! # Frame Recorder
//!
//! Records transmitted channel values to JSONL (JSON Lines) files.
//!
//! This module handles:
//! - Formatting one record per line (timestamp, output mode, pulses)
//! - Rotating to a new file after `max_records_per_file` records
//! - Retaining only the newest `max_files_to_keep` files
//! - Throttling to at most one record per `interval_ms`
//!
//! Files are named `frames_<UTC timestamp>_<sequence>.jsonl`, so sorting by
//! name sorts by age.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RecorderConfig;
use crate::error::Result;
use crate::frame::OutputMode;

const FILE_PREFIX: &str = "frames_";
const FILE_EXTENSION: &str = "jsonl";

/// One recorded frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord<'a> {
    pub timestamp: String,
    pub mode: String,
    pub devices: usize,
    pub pulses: &'a [u16],
}

/// JSONL recorder with rotation.
pub struct FrameRecorder {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    interval: Duration,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    files_created: u64,
    last_record: Option<Instant>,
}

impl std::fmt::Debug for FrameRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRecorder")
            .field("dir", &self.dir)
            .field("records_in_file", &self.records_in_file)
            .finish_non_exhaustive()
    }
}

impl FrameRecorder {
    /// Creates the recorder and its directory. No file is opened until the
    /// first record.
    ///
    /// # Errors
    ///
    /// Returns `Io` error if the directory cannot be created.
    pub fn new(config: &RecorderConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;
        info!("Recording frames to {}", dir.display());
        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file.max(1),
            max_files_to_keep: config.max_files_to_keep.max(1),
            interval: Duration::from_millis(config.interval_ms),
            writer: None,
            records_in_file: 0,
            files_created: 0,
            last_record: None,
        })
    }

    /// Records one frame unless the previous record is more recent than the
    /// configured interval.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` if a line was written
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Json` error if the record cannot be written.
    pub fn record(&mut self, mode: OutputMode, devices: usize, pulses: &[u16]) -> Result<bool> {
        let now = Instant::now();
        if self
            .last_record
            .is_some_and(|last| now.duration_since(last) < self.interval)
        {
            return Ok(false);
        }
        self.last_record = Some(now);
        self.write_record(Utc::now(), mode, devices, pulses)?;
        Ok(true)
    }

    fn write_record(
        &mut self,
        at: DateTime<Utc>,
        mode: OutputMode,
        devices: usize,
        pulses: &[u16],
    ) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate(at)?;
        }

        let record = FrameRecord {
            timestamp: at.to_rfc3339(),
            mode: mode.to_string(),
            devices,
            pulses,
        };
        let line = serde_json::to_string(&record)?;

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{line}")?;
            writer.flush()?;
        }
        self.records_in_file += 1;
        Ok(())
    }

    fn rotate(&mut self, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.files_created += 1;
        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            at.format("%Y%m%dT%H%M%S"),
            self.files_created,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);
        debug!("Opening record file {}", path.display());

        self.writer = Some(BufWriter::new(File::create(&path)?));
        self.records_in_file = 0;
        self.prune();
        Ok(())
    }

    /// Deletes the oldest files beyond the retention limit.
    fn prune(&self) {
        let mut files = match record_files(&self.dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to list {}: {}", self.dir.display(), e);
                return;
            }
        };
        if files.len() <= self.max_files_to_keep {
            return;
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Lists recorder files in `dir`.
///
/// # Errors
///
/// Returns the underlying I/O error if the directory cannot be read.
pub fn record_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_record = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_EXTENSION));
        if is_record {
            files.push(path);
        }
    }
    Ok(files)
}
