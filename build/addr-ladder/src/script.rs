// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, error};

use crate::LadderError;

/// Handle on the shared linker script.
///
/// The contents are read exactly once, when the handle is opened, and that
/// snapshot is the only thing ever written back. Edits are made through
/// [`LinkScript::edit`], which borrows the handle mutably, so at most one
/// edit can be in effect at a time.
#[derive(Debug)]
pub struct LinkScript {
    /// Path as given by the caller, for messages.
    path: PathBuf,
    /// Where writes actually land (symlinks resolved), so that replacing the
    /// file doesn't clobber a link.
    target: PathBuf,
    original: String,
    permissions: Permissions,
}

impl LinkScript {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LadderError> {
        let path = path.into();
        let read_err = |source| LadderError::Read {
            path: path.clone(),
            source,
        };

        let target = fs::canonicalize(&path).map_err(read_err)?;
        let bytes = fs::read(&target).map_err(read_err)?;
        let permissions =
            fs::metadata(&target).map_err(read_err)?.permissions();
        let original =
            String::from_utf8(bytes).map_err(|source| LadderError::Encoding {
                path: path.clone(),
                source,
            })?;

        debug!("snapshot of {}: {} bytes", path.display(), original.len());

        Ok(LinkScript {
            path,
            target,
            original,
            permissions,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The contents captured when the handle was opened.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Replaces the script with `contents` until the returned guard is
    /// restored or dropped.
    ///
    /// Writes go through a temporary file that is renamed into place, so a
    /// failed write leaves the original untouched.
    pub fn edit(
        &mut self,
        contents: &str,
    ) -> Result<ScopedEdit<'_>, LadderError> {
        write_atomic(&self.target, contents.as_bytes(), &self.permissions)
            .map_err(|source| LadderError::Write {
                path: self.path.clone(),
                source,
            })?;
        Ok(ScopedEdit {
            script: self,
            armed: true,
        })
    }

    /// Checks whether the file on disk still matches the snapshot.
    pub fn is_pristine(&self) -> Result<bool, LadderError> {
        let now = fs::read(&self.target).map_err(|source| LadderError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(now == self.original.as_bytes())
    }

    fn put_back(&self) -> Result<(), LadderError> {
        write_atomic(&self.target, self.original.as_bytes(), &self.permissions)
            .map_err(|source| LadderError::Restore {
                path: self.path.clone(),
                source,
            })
    }
}

/// An edit of the linker script that is in effect while this value lives.
///
/// Call [`ScopedEdit::restore`] to put the original back and find out
/// whether that worked. If the guard is dropped instead (an early return, or
/// a panic unwinding through the build), the original is still put back and
/// any failure is logged.
#[must_use = "dropping the edit restores the linker script immediately"]
pub struct ScopedEdit<'a> {
    script: &'a LinkScript,
    armed: bool,
}

impl ScopedEdit<'_> {
    pub fn restore(mut self) -> Result<(), LadderError> {
        self.armed = false;
        self.script.put_back()
    }
}

impl Drop for ScopedEdit<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.script.put_back() {
            error!("{}", e);
            if let Some(source) = std::error::Error::source(&e) {
                error!("  caused by: {}", source);
            }
        }
    }
}

fn write_atomic(
    path: &Path,
    contents: &[u8],
    permissions: &Permissions,
) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), permissions.clone())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
