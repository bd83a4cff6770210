use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use fs2::FileExt;
use tracing::debug;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(120);

pub enum AcquireState {
    Acquired(RunLock),
    Busy,
}

pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!(path = %self.path.display(), "run lock released");
    }
}

pub fn lock_path_for(session_path: &Path) -> PathBuf {
    let mut name: OsString = session_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("session"));
    name.push(".lock");
    session_path.with_file_name(name)
}

pub fn try_acquire(path: &Path) -> Result<AcquireState> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create lock directory {}", parent.display()))?;
    }

    let file = open_lock_file(path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(AcquireState::Acquired(RunLock {
            file,
            path: path.to_path_buf(),
        })),
        Err(_) => Ok(AcquireState::Busy),
    }
}

pub fn acquire(path: &Path, wait: Duration) -> Result<RunLock> {
    let deadline = Instant::now() + wait;
    loop {
        match try_acquire(path)? {
            AcquireState::Acquired(lock) => {
                debug!(path = %path.display(), "run lock acquired");
                return Ok(lock);
            }
            AcquireState::Busy => {
                if Instant::now() >= deadline {
                    bail!(
                        "another poll is still running (lock {} held for over {}s)",
                        path.display(),
                        wait.as_secs()
                    );
                }
                thread::sleep(LOCK_RETRY_INTERVAL);
            }
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open lock file {}", path.display()))
}
