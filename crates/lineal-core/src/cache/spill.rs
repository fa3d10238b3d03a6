//! Spill store: evicted matrix blobs on local disk.
//!
//! Blobs are written to `{out_dir}/{lineage id}` with bincode. The working
//! directory is created lazily on first spill and removed when the store is
//! dropped; spill files are transient and never survive the process.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lineage::LineageRef;
use crate::runtime::MatrixBlock;

/// Location and cost of one spilled blob.
#[derive(Debug, Clone)]
pub struct SpillRecord {
    /// File holding the serialized blob.
    pub path: PathBuf,
    /// Execution time of the producing instruction, carried across the
    /// spill so rehydrated entries keep their eviction score.
    pub exec_time_ns: u64,
}

#[derive(Debug)]
enum SpillDir {
    /// Auto-cleaned temporary directory.
    Temp(TempDir),
    /// Caller-provided directory; removed on drop.
    Fixed(PathBuf),
}

impl SpillDir {
    fn path(&self) -> &std::path::Path {
        match self {
            Self::Temp(dir) => dir.path(),
            Self::Fixed(path) => path,
        }
    }
}

/// Writes evicted blobs to disk and reads them back on demand.
#[derive(Debug)]
pub(crate) struct SpillStore {
    workdir: Option<PathBuf>,
    dir: Option<SpillDir>,
}

impl SpillStore {
    pub(crate) fn new(workdir: Option<PathBuf>) -> Self {
        Self { workdir, dir: None }
    }

    /// The working directory, created on first use.
    fn ensure_dir(&mut self) -> Result<&std::path::Path> {
        if self.dir.is_none() {
            let dir = match &self.workdir {
                Some(parent) => {
                    let path = parent.join(format!("lineage-{}", std::process::id()));
                    fs::create_dir_all(&path)?;
                    SpillDir::Fixed(path)
                }
                None => SpillDir::Temp(
                    tempfile::Builder::new().prefix("lineage-").tempdir()?,
                ),
            };
            debug!(dir = %dir.path().display(), "created spill directory");
            self.dir = Some(dir);
        }
        match &self.dir {
            Some(dir) => Ok(dir.path()),
            None => Err(Error::Internal("spill directory unavailable".into())),
        }
    }

    /// Serializes a blob for the given key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` on file creation failures and
    /// `Error::Serialization` on codec failures.
    pub(crate) fn write(
        &mut self,
        key: &LineageRef,
        block: &MatrixBlock,
        exec_time_ns: u64,
    ) -> Result<SpillRecord> {
        let path = self.ensure_dir()?.join(key.id().to_string());
        let file = File::create(&path)?;
        bincode::serialize_into(BufWriter::new(file), block)?;
        Ok(SpillRecord { path, exec_time_ns })
    }

    /// Reads a blob back and deletes its file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` / `Error::Serialization` when the blob cannot be
    /// produced; the caller is relying on the value, so these propagate.
    pub(crate) fn read(&self, record: &SpillRecord) -> Result<MatrixBlock> {
        let file = File::open(&record.path)?;
        let block: MatrixBlock = bincode::deserialize_from(BufReader::new(file))?;
        if let Err(err) = fs::remove_file(&record.path) {
            warn!(path = %record.path.display(), %err, "failed to delete rehydrated spill file");
        }
        Ok(block)
    }

    /// Deletes the file behind a dropped record.
    pub(crate) fn discard(&self, record: &SpillRecord) {
        if let Err(err) = fs::remove_file(&record.path) {
            warn!(path = %record.path.display(), %err, "failed to delete spill file");
        }
    }
}

impl Drop for SpillStore {
    fn drop(&mut self) {
        if let Some(SpillDir::Fixed(path)) = &self.dir {
            if let Err(err) = fs::remove_dir_all(path) {
                warn!(path = %path.display(), %err, "failed to remove spill directory");
            }
        }
    }
}

/// Guard against spilling entries that can never be rehydrated.
pub(crate) fn spillable_block(value: Option<&crate::runtime::Value>) -> Result<&MatrixBlock> {
    match value {
        Some(crate::runtime::Value::Matrix(block)) => Ok(block),
        Some(crate::runtime::Value::Scalar(_)) => Err(Error::SpillInvalid(
            "scalar entries are never spilled".into(),
        )),
        None => Err(Error::SpillInvalid("cannot spill a valueless entry".into())),
    }
}
