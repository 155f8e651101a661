// SPDX-License-Identifier: MIT
//! Write-to-temp-then-rename file replacement

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// A fully written temporary file waiting to replace `target`
///
/// The temp file sits in the target's directory so the final rename stays on
/// one filesystem. Dropping the guard without [`commit`](Self::commit)
/// removes the temp file and leaves `target` untouched.
#[derive(Debug)]
pub struct AtomicFile {
    target: PathBuf,
    temp: PathBuf,
    durable: bool,
    committed: bool,
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

impl AtomicFile {
    /// Write `contents` to a fresh temp file next to `target`
    pub fn create(target: &Path, contents: &[u8], durable: bool) -> std::io::Result<Self> {
        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{:?} has no file name", target),
                )
            })?;
        let temp = parent_dir(target).join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        debug!("Writing temp file: {:?}", temp);
        let guard = Self {
            target: target.to_path_buf(),
            temp,
            durable,
            committed: false,
        };
        // On failure the guard's drop removes the partial temp file
        guard.write(contents)?;
        Ok(guard)
    }

    fn write(&self, contents: &[u8]) -> std::io::Result<()> {
        let mut file = File::create(&self.temp)?;
        file.write_all(contents)?;
        if self.durable {
            file.sync_all()?;
        }
        Ok(())
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Rename the temp file over the target
    pub fn commit(mut self) -> std::io::Result<()> {
        debug!("Moving {:?} to {:?}", self.temp, self.target);
        fs::rename(&self.temp, &self.target)?;
        self.committed = true;

        // Persist the rename itself; the data is already in place
        if self.durable {
            match File::open(parent_dir(&self.target)) {
                Ok(dir) => {
                    if let Err(e) = dir.sync_all() {
                        warn!("Failed to sync parent directory after rename: {}", e);
                    }
                }
                Err(e) => warn!("Failed to open parent directory for sync: {}", e),
            }
        }
        Ok(())
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = fs::remove_file(&self.temp) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove temp file {:?}: {}", self.temp, e);
            }
        }
    }
}
