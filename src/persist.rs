/// Atomic JSON state files.
///
/// State is written pretty-printed (diffable by an operator) to a temporary
/// file in the destination directory and renamed over the target, so a crash
/// mid-write leaves either the old or the new file, never a torn one.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Reads and deserializes `path`. `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateFileError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StateFileError::Io { path: path.display().to_string(), source: e }),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| StateFileError::Malformed { path: path.display().to_string(), source: e })
}

/// Serializes `value` and atomically replaces `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StateFileError> {
    let io_err = |e: io::Error| StateFileError::Io { path: path.display().to_string(), source: e };

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| StateFileError::Malformed { path: path.display().to_string(), source: e })?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(json.as_bytes()).map_err(io_err)?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StateFileError {
    #[error("cannot access state file {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("state file {path} is malformed: {source}")]
    Malformed { path: String, source: serde_json::Error },
}
