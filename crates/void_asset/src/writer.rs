//! Atomic durable writes
//!
//! Every persisted artifact goes through the same sequence: produce into a
//! uniquely named temp file in the destination directory, flush it to disk,
//! then rename it over the destination. Readers observe either the old file
//! or the complete new one. On failure the temp file is removed and the
//! destination is left untouched.

use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Stage at which an atomic write failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStage {
    /// Validating the copy source
    Source,
    /// Creating the destination directory or temp name
    TempPath,
    /// Running the producer
    Produce,
    /// Flushing the temp file to disk
    Sync,
    /// Renaming onto the destination
    Rename,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Source => "source check",
            Self::TempPath => "temp file creation",
            Self::Produce => "produce",
            Self::Sync => "sync",
            Self::Rename => "rename",
        };
        f.write_str(stage)
    }
}

/// Failure of an atomic write
#[derive(Debug, Error)]
#[error("Atomic write of {} failed during {stage}: {source}", .path.display())]
pub struct WriteError {
    /// Destination that was being written
    pub path: PathBuf,
    /// Failing stage
    pub stage: WriteStage,
    /// Underlying IO error
    #[source]
    pub source: io::Error,
}

impl WriteError {
    fn new(path: &Path, stage: WriteStage, source: io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            stage,
            source,
        }
    }

    /// Kind of the underlying IO error
    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

/// Temp file name used for a destination: `<dir>/.<uuid>.temp`
pub fn temp_path_for(destination: &Path) -> io::Result<PathBuf> {
    let dir = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(dir.join(format!(".{}.temp", uuid::Uuid::new_v4())))
}

/// Atomically produce `destination` with `producer`
///
/// The producer receives the temp path and must write the full content to it.
pub fn atomic_write_file<F>(destination: &Path, producer: F) -> Result<(), WriteError>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| WriteError::new(destination, WriteStage::TempPath, e))?;
    }

    let temp = temp_path_for(destination)
        .map_err(|e| WriteError::new(destination, WriteStage::TempPath, e))?;

    let result = commit(destination, &temp, producer);
    if result.is_err() && temp.exists() {
        if let Err(e) = fs::remove_file(&temp) {
            log::warn!("Failed to remove temp file {}: {}", temp.display(), e);
        }
    }
    result
}

fn commit<F>(destination: &Path, temp: &Path, producer: F) -> Result<(), WriteError>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    producer(temp).map_err(|e| WriteError::new(destination, WriteStage::Produce, e))?;

    File::open(temp)
        .and_then(|f| f.sync_all())
        .map_err(|e| WriteError::new(destination, WriteStage::Sync, e))?;

    fs::rename(temp, destination)
        .map_err(|e| WriteError::new(destination, WriteStage::Rename, e))
}

/// Atomically write a byte buffer
pub fn atomic_write_bytes(destination: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    atomic_write_file(destination, |temp| fs::write(temp, bytes))
}

/// Atomically write pretty JSON
pub fn atomic_write_json<T: Serialize + ?Sized>(destination: &Path, value: &T) -> Result<(), WriteError> {
    atomic_write_file(destination, |temp| {
        let mut writer = BufWriter::new(File::create(temp)?);
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.flush()
    })
}

/// Atomically write a bincode-encoded value
pub fn atomic_write_bincode<T: Serialize + ?Sized>(destination: &Path, value: &T) -> Result<(), WriteError> {
    atomic_write_file(destination, |temp| {
        let mut writer = BufWriter::new(File::create(temp)?);
        bincode::serialize_into(&mut writer, value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.flush()
    })
}

/// Atomically copy a regular file
pub fn atomic_copy_file(source: &Path, destination: &Path) -> Result<(), WriteError> {
    let metadata = fs::metadata(source).map_err(|e| {
        let err = if e.kind() == io::ErrorKind::NotFound {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Source file {} does not exist", source.display()),
            )
        } else {
            e
        };
        WriteError::new(destination, WriteStage::Source, err)
    })?;

    if !metadata.is_file() {
        return Err(WriteError::new(
            destination,
            WriteStage::Source,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Source {} is not a regular file", source.display()),
            ),
        ));
    }

    atomic_write_file(destination, |temp| fs::copy(source, temp).map(|_| ()))
}
