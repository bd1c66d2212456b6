//! Scoped output files.
//!
//! Export output is written to a temporary sibling of the target path and
//! only renamed into place once the whole run succeeded:
//! - write to `<file>.tmp` through a buffered writer
//! - on [`ScopedOutput::commit`], flush, `fsync`, then rename
//! - on drop without commit, the temp file is removed
//!
//! A failed export therefore never leaves a truncated file at the target.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

/// Output file that only appears at its final path on success.
pub struct ScopedOutput {
    path: PathBuf,
    temp_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl ScopedOutput {
    /// Create the temp file next to `path`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the parent directory or temp file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);

        let file = File::create(&temp_path)?;
        debug!(path = %temp_path.display(), "opened scoped output");
        Ok(Self {
            path: path.to_path_buf(),
            temp_path,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Final destination.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush, sync and atomically move the file into place.
    ///
    /// # Errors
    ///
    /// Returns `Io` if flushing, syncing or renaming fails; the temp file is
    /// removed in that case.
    pub fn commit(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
            file.sync_all()?;
        }
        fs::rename(&self.temp_path, &self.path)?;
        Ok(self.path.clone())
    }
}

impl Write for ScopedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(io::Error::other("output already committed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.as_mut().map_or(Ok(()), Write::flush)
    }
}

impl Drop for ScopedOutput {
    fn drop(&mut self) {
        // Close before removing, for platforms that refuse to unlink open files.
        self.writer.take();
        if self.temp_path.exists() {
            if let Err(e) = fs::remove_file(&self.temp_path) {
                warn!(path = %self.temp_path.display(), error = %e, "failed to remove temp output");
            }
        }
    }
}
