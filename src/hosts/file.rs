//! Exclusive access to the hosts file.
//!
//! The file is opened read+write and locked exclusively. Other writers are
//! shut out while the lock is held; readers are not. On Unix this is an
//! advisory `flock`; on Windows the handle's share mode (read only) does the
//! job, since a byte-range lock would also block readers. A missing or
//! forbidden file fails straight away, contention is retried a bounded number
//! of times.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(not(windows))]
use fs2::FileExt;
use log::debug;
use tokio::time::sleep;

use crate::error::HostsError;

/// Number of lock attempts before giving up.
pub const LOCK_ATTEMPTS: u32 = 5;

/// Pause between two lock attempts.
pub const LOCK_RETRY_DELAY: Duration = Duration::from_secs(1);

#[cfg(windows)]
const FILE_SHARE_READ: u32 = 0x0000_0001;
#[cfg(windows)]
const ERROR_SHARING_VIOLATION: i32 = 32;
#[cfg(windows)]
const ERROR_LOCK_VIOLATION: i32 = 33;

#[derive(Debug, Clone)]
pub struct HostsFile {
    path: PathBuf,
    attempts: u32,
    retry_delay: Duration,
}

enum Attempt {
    Contended,
    Failed(HostsError),
}

impl HostsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            attempts: LOCK_ATTEMPTS,
            retry_delay: LOCK_RETRY_DELAY,
        }
    }

    /// Overrides the contention retry policy.
    #[cfg(test)]
    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens and exclusively locks the file.
    ///
    /// The returned guard releases the lock when dropped, so at most one
    /// guard is alive per reconciliation.
    pub async fn acquire(&self) -> Result<HostsLock, HostsError> {
        let mut tried = 0;
        for attempt in 1..=self.attempts {
            tried += 1;
            match self.try_acquire() {
                Ok(lock) => return Ok(lock),
                Err(Attempt::Failed(e)) => return Err(e),
                Err(Attempt::Contended) => {
                    debug!(
                        "Hosts file {} is locked (attempt {}/{})",
                        self.path.display(),
                        attempt,
                        self.attempts
                    );
                    if attempt < self.attempts {
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(HostsError::Locked { attempts: tried })
    }

    fn try_acquire(&self) -> Result<HostsLock, Attempt> {
        let file = self.open().map_err(|e| self.classify(e))?;
        match lock_writers_out(&file) {
            Ok(()) => Ok(HostsLock { file }),
            Err(e) if is_contended(&e) => Err(Attempt::Contended),
            Err(e) => Err(Attempt::Failed(e.into())),
        }
    }

    #[cfg(not(windows))]
    fn open(&self) -> io::Result<File> {
        OpenOptions::new().read(true).write(true).open(&self.path)
    }

    #[cfg(windows)]
    fn open(&self) -> io::Result<File> {
        use std::os::windows::fs::OpenOptionsExt;

        OpenOptions::new()
            .read(true)
            .write(true)
            .share_mode(FILE_SHARE_READ)
            .open(&self.path)
    }

    fn classify(&self, e: io::Error) -> Attempt {
        match e.kind() {
            io::ErrorKind::NotFound => Attempt::Failed(HostsError::NotFound(self.path.clone())),
            io::ErrorKind::PermissionDenied if !is_contended(&e) => {
                Attempt::Failed(HostsError::PermissionDenied(self.path.clone()))
            }
            _ if is_contended(&e) => Attempt::Contended,
            _ => Attempt::Failed(e.into()),
        }
    }
}

#[cfg(not(windows))]
fn lock_writers_out(file: &File) -> io::Result<()> {
    file.try_lock_exclusive()
}

// The read-only share mode requested at open time already excludes writers.
#[cfg(windows)]
fn lock_writers_out(_file: &File) -> io::Result<()> {
    Ok(())
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || (e.raw_os_error().is_some()
            && e.raw_os_error() == fs2::lock_contended_error().raw_os_error())
        || is_sharing_violation(e)
}

#[cfg(windows)]
fn is_sharing_violation(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
    )
}

#[cfg(not(windows))]
fn is_sharing_violation(_e: &io::Error) -> bool {
    false
}

/// Exclusive handle on the hosts file. Unlocks on drop.
#[derive(Debug)]
pub struct HostsLock {
    file: File,
}

impl HostsLock {
    /// Reads the whole file.
    pub fn read(&mut self) -> Result<String, HostsError> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        String::from_utf8(buf).map_err(HostsError::InvalidContent)
    }

    /// Replaces the whole file with `content`, truncating stale bytes.
    pub fn replace(&mut self, content: &str) -> Result<(), HostsError> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(content.as_bytes())?;
        self.file.set_len(content.len() as u64)?;
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(not(windows))]
impl Drop for HostsLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
