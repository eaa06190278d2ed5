//! One running process per application title and version.

use fs2::FileExt;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use super::BootstrapError;

/// Exclusive OS lock on `<dir>/<key>.lock`, held until dropped.
///
/// The lock file itself is left behind; only the OS lock marks a running instance.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Take the lock for `key` (normally [`AppInfo::title_version`](crate::AppInfo::title_version)).
    ///
    /// # Errors
    /// - [`BootstrapError::AlreadyRunning`] if another process holds it.
    /// - [`BootstrapError::InstanceLock`] if the lock file cannot be created or locked.
    pub fn acquire(dir: &Path, key: &str) -> Result<Self, BootstrapError> {
        let path = dir.join(format!("{}.lock", file_stem(key)));
        let io_error = |source| BootstrapError::InstanceLock {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(io_error)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_error)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(BootstrapError::AlreadyRunning {
                    app: key.to_owned(),
                    lock: path,
                });
            }
            return Err(io_error(e));
        }

        // Informational only.
        file.set_len(0).map_err(io_error)?;
        writeln!(file, "{}", std::process::id()).map_err(io_error)?;

        tracing::debug!(lock = %path.display(), "Instance lock acquired");
        Ok(Self { file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        // Closing the file releases the lock as well.
        let _ = FileExt::unlock(&self.file);
    }
}

/// `"DeskHost v1.0"` -> `"DeskHost-v1.0"`.
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
