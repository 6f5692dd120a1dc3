//! Pid-file lock keeping two processes from running the same roots at once.

use std::{
    fs::{self, OpenOptions},
    hash::{DefaultHasher, Hash, Hasher},
    io::{self, Write},
    path::{Path, PathBuf},
    process,
};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("already running as process {pid} (lock file {})", path.display())]
    Held { pid: u32, path: PathBuf },

    #[error("could not use lock file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Held for as long as the value lives; the pid file is removed on drop.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
}

impl ProcessLock {
    /// Takes the lock for `key` in `directory`.
    ///
    /// A pid file left behind by a process that no longer exists is stale and
    /// gets replaced.
    pub fn acquire(directory: &Path, key: &str) -> Result<Self, LockError> {
        let io_error = |path: &Path, source: io::Error| LockError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(directory).map_err(|source| io_error(directory, source))?;
        let path = directory.join(lock_file_name(key));

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    write!(file, "{}", process::id()).map_err(|source| io_error(&path, source))?;
                    debug!(path = %path.display(), "took process lock");
                    return Ok(Self { path });
                }
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                    if let Some(pid) = read_pid(&path)
                        && pid != process::id()
                        && process_alive(pid)
                    {
                        return Err(LockError::Held { pid, path });
                    }
                    debug!(path = %path.display(), "removing stale lock file");
                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                        Err(error) => return Err(io_error(&path, error)),
                    }
                }
                Err(error) => return Err(io_error(&path, error)),
            }
        }
        Err(io_error(
            &path,
            io::Error::new(io::ErrorKind::AlreadyExists, "lock file was recreated while taking the lock"),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

pub(crate) fn lock_file_name(key: &str) -> String {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    format!("taskrun-{:016x}.pid", hasher.finish())
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn process_alive(pid: u32) -> bool {
    if cfg!(target_os = "linux") {
        Path::new("/proc").join(pid.to_string()).exists()
    } else {
        true
    }
}
