//! Scratch files carrying values between parent and child.
//!
//! Every value crosses the boundary as a JSON file referenced by a
//! [`ValueHandle`]. Ownership rules:
//! - whoever decodes a handle deletes it ([`take`])
//! - whoever wrote a handle deletes it if the reader never ran ([`ScratchFile`] drop)
//!
//! Deletion is best-effort: a file that is already gone is fine, anything else is
//! logged and swallowed.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};

use crate::bridge::protocol::ValueHandle;

/// Environment variable the parent uses to hand its scratch directory to the child.
pub const SCRATCH_DIR_ENV: &str = "SUBENV_SCRATCH_DIR";

/// Prefix for files written by the child.
pub const CHILD_PREFIX: &str = "subenv_session_";
/// Prefix for files written by the parent.
pub const PARENT_PREFIX: &str = "subenv_session_parent_";

const SUFFIX: &str = ".json";

#[derive(Debug, thiserror::Error)]
pub enum ScratchError {
    #[error("scratch file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode value from {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ScratchError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where and under which prefix one side allocates scratch files.
#[derive(Debug, Clone)]
pub struct Scratch {
    dir: PathBuf,
    prefix: &'static str,
}

impl Scratch {
    pub fn new(dir: impl Into<PathBuf>, prefix: &'static str) -> Self {
        Self {
            dir: dir.into(),
            prefix,
        }
    }

    /// Parent-side allocator in `dir`.
    pub fn parent(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, PARENT_PREFIX)
    }

    /// Child-side allocator, honoring the directory the parent forwarded.
    pub fn child_from_env() -> Self {
        let dir = std::env::var_os(SCRATCH_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self::new(dir, CHILD_PREFIX)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize `value` into a fresh, uniquely named file.
    ///
    /// On any failure the partially written file is removed before returning.
    pub fn spill<T: Serialize + ?Sized>(&self, value: &T) -> Result<ScratchFile, ScratchError> {
        let named = tempfile::Builder::new()
            .prefix(self.prefix)
            .suffix(SUFFIX)
            .tempfile_in(&self.dir)
            .map_err(|e| ScratchError::io(&self.dir, e))?;

        // NamedTempFile removes itself on drop until `keep` succeeds.
        {
            let mut writer = BufWriter::new(named.as_file());
            serde_json::to_writer(&mut writer, value).map_err(ScratchError::Encode)?;
            writer
                .flush()
                .map_err(|e| ScratchError::io(named.path(), e))?;
        }

        let path = named
            .into_temp_path()
            .keep()
            .map_err(|e| ScratchError::io(&self.dir, e.error))?;
        tracing::trace!(path = %path.display(), "Spilled value");

        Ok(ScratchFile { path: Some(path) })
    }
}

/// Owned scratch file, removed on drop unless handed off with [`ScratchFile::into_handle`].
#[derive(Debug)]
pub struct ScratchFile {
    path: Option<PathBuf>,
}

impl ScratchFile {
    /// Adopt an existing file so it is removed on every exit path.
    pub fn adopt(handle: &ValueHandle) -> Self {
        Self {
            path: Some(handle.path().to_path_buf()),
        }
    }

    /// Handle to pass along while this guard keeps ownership.
    pub fn handle(&self) -> ValueHandle {
        ValueHandle::new(self.path.clone().unwrap_or_default())
    }

    /// Give up ownership: the receiving side becomes responsible for deletion.
    pub fn into_handle(mut self) -> ValueHandle {
        ValueHandle::new(self.path.take().unwrap_or_default())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            remove_quietly(&path);
        }
    }
}

/// Decode the value behind `handle` and delete the file, whether or not decoding worked.
pub fn take<T: DeserializeOwned>(handle: &ValueHandle) -> Result<T, ScratchError> {
    let _guard = ScratchFile::adopt(handle);
    let path = handle.path();

    let file = File::open(path).map_err(|e| ScratchError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| ScratchError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Delete a handle nobody is going to read.
pub fn discard(handle: &ValueHandle) {
    remove_quietly(handle.path());
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::trace!(path = %path.display(), "Removed scratch file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch file")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn spill_then_take_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Scratch::parent(dir.path());

        let handle = scratch.spill(&json!({"a": [1, 2, 3]})).unwrap().into_handle();
        let name = handle.path().file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with(PARENT_PREFIX), "{name}");
        assert!(name.ends_with(".json"), "{name}");

        let value: serde_json::Value = take(&handle).unwrap();
        assert_eq!(value, json!({"a": [1, 2, 3]}));
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn dropping_guard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Scratch::parent(dir.path());

        let file = scratch.spill(&42).unwrap();
        let handle = file.handle();
        assert!(handle.path().exists());

        drop(file);
        assert!(!handle.path().exists());
    }

    #[test]
    fn take_removes_file_even_when_decoding_fails() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Scratch::parent(dir.path());
        let handle = scratch.spill("not a number").unwrap().into_handle();

        let err = take::<u32>(&handle).unwrap_err();
        assert!(matches!(err, ScratchError::Decode { .. }), "{err}");
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn take_of_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ValueHandle::new(dir.path().join("gone.json"));

        let err = take::<serde_json::Value>(&handle).unwrap_err();
        assert!(matches!(err, ScratchError::Io { .. }), "{err}");
    }

    #[test]
    fn spill_into_missing_dir_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Scratch::parent(dir.path().join("nope"));

        assert!(matches!(
            scratch.spill(&1).unwrap_err(),
            ScratchError::Io { .. }
        ));
    }

    #[test]
    fn discard_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let handle = Scratch::parent(dir.path()).spill(&1).unwrap().into_handle();

        discard(&handle);
        discard(&handle);
        assert_eq!(entries(dir.path()), 0);
    }
}
