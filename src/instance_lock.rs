use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Exclusive lock that keeps two pollers off the same store.
///
/// The lock file sits next to the database (`<db>.lock`) and holds the PID of
/// the owner. The flock is released when the process dies, so a stale file
/// left by a crash does not block the next start.
pub struct InstanceLock {
    lock_file: File,
    lock_path: PathBuf,
}

impl InstanceLock {
    pub fn for_store(db_path: &Path) -> Result<Self> {
        Self::acquire(Self::lock_path_for(db_path))
    }

    pub fn lock_path_for(db_path: &Path) -> PathBuf {
        let mut path = db_path.as_os_str().to_owned();
        path.push(".lock");
        PathBuf::from(path)
    }

    fn acquire(lock_path: PathBuf) -> Result<Self> {
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create lock directory")?;
        }

        // Truncate only after the flock is held so a running owner's PID survives
        let mut lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .context("Failed to open lock file")?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = lock_file.as_raw_fd();
            let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
            if result != 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    let owner = std::fs::read_to_string(&lock_path).unwrap_or_default();
                    anyhow::bail!(
                        "Another skywatch instance (pid {}) is using this store. Lock file: {}",
                        owner.trim(),
                        lock_path.display()
                    );
                }
                return Err(err).context("Failed to acquire lock");
            }
        }

        let pid = std::process::id();
        lock_file.set_len(0).context("Failed to truncate lock file")?;
        writeln!(lock_file, "{}", pid).context("Failed to write PID to lock file")?;

        info!("Acquired instance lock at {}", lock_path.display());
        debug!("Process ID: {}", pid);

        Ok(Self {
            lock_file,
            lock_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = self.lock_file.as_raw_fd();
            unsafe {
                libc::flock(fd, libc::LOCK_UN);
            }
        }

        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            eprintln!("Failed to remove lock file: {}", e);
        } else {
            debug!("Released instance lock at {}", self.lock_path.display());
        }
    }
}
