//! Named-pipe transport setup
//!
//! The camera process writes raw frames into a FIFO at a well-known path.
//! An existing FIFO is reused; any other file type at that path is fatal.

use crate::error::TransportError;
use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Default transport path shared with the capture process
pub const DEFAULT_STREAM_PATH: &str = "/tmp/stream_pipe";

/// World read/write so an unprivileged producer can attach
pub const DEFAULT_FIFO_MODE: u32 = 0o666;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoStatus {
    Created,
    Reused,
}

/// Create the FIFO at `path` if absent, or verify the existing entry is one
pub fn ensure_fifo(path: &Path, mode: u32) -> Result<FifoStatus, TransportError> {
    match fs::metadata(path) {
        Ok(meta) => {
            if !meta.file_type().is_fifo() {
                return Err(TransportError::NotAFifo(path.to_path_buf()));
            }
            Ok(reuse_existing(
                path,
                fs::set_permissions(path, fs::Permissions::from_mode(mode)),
            ))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let c_path = CString::new(path.as_os_str().as_bytes())
                .map_err(|_| TransportError::InvalidPath(path.to_path_buf()))?;

            // SAFETY: c_path is a valid NUL-terminated string for the call
            let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
            if rc != 0 {
                return Err(TransportError::Create {
                    path: path.to_path_buf(),
                    source: io::Error::last_os_error(),
                });
            }
            // mkfifo honours the umask; apply the requested mode explicitly
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
            log::info!("Created named pipe: {}", path.display());
            Ok(FifoStatus::Created)
        }
        Err(e) => Err(TransportError::Io(e)),
    }
}

/// A pipe owned by another user keeps its mode; the reader can still attach
fn reuse_existing(path: &Path, chmod: io::Result<()>) -> FifoStatus {
    if let Err(e) = chmod {
        log::warn!("Reusing {} without changing its mode: {}", path.display(), e);
    }
    FifoStatus::Reused
}

/// Release a reader parked in `open()` by briefly attaching a writer
///
/// The reader then sees end-of-stream. Returns `false` when no reader was
/// waiting.
pub fn wake_reader(path: &Path) -> Result<bool, TransportError> {
    match OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
    {
        Ok(_writer) => Ok(true),
        Err(e) if e.raw_os_error() == Some(libc::ENXIO) => Ok(false),
        Err(e) => Err(TransportError::Io(e)),
    }
}

/// Owns a FIFO this process created and unlinks it on drop
#[derive(Debug)]
pub struct FifoGuard {
    path: PathBuf,
    created: bool,
}

impl FifoGuard {
    pub fn ensure(path: impl Into<PathBuf>, mode: u32) -> Result<Self, TransportError> {
        let path = path.into();
        let status = ensure_fifo(&path, mode)?;
        Ok(Self {
            path,
            created: status == FifoStatus::Created,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created(&self) -> bool {
        self.created
    }
}

impl Drop for FifoGuard {
    fn drop(&mut self) {
        if self.created {
            if let Err(e) = fs::remove_file(&self.path) {
                log::warn!("Failed to unlink {}: {}", self.path.display(), e);
            }
        }
    }
}
