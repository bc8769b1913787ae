//! Process startup glue: daemonization and PID file.
//!
//! # Responsibilities
//! - Detach from the controlling terminal (fork, setsid, umask, stdio to /dev/null)
//! - Write the PID file after detaching, remove it on exit
//!
//! # Design Decisions
//! - Daemonize before the poller is created, while the process has one thread
//! - A PID file that cannot be written is logged, not fatal

use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("fork failed: {0}")]
    Fork(io::Error),

    #[error("setsid failed: {0}")]
    Setsid(io::Error),

    #[error("cannot redirect standard streams: {0}")]
    Stdio(io::Error),

    #[error("could not write pidfile {path}: {source}")]
    PidFile { path: PathBuf, source: io::Error },
}

/// Which side of the fork this process is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forked {
    /// Original process; it should exit immediately with status 0.
    Parent,
    /// Detached daemon; continue starting up.
    Child,
}

/// Detach from the controlling terminal.
pub fn daemonize(umask: u32) -> Result<Forked, StartupError> {
    // SAFETY: called before the event loop starts; the process has a single
    // thread, so the child inherits a consistent address space.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(StartupError::Fork(io::Error::last_os_error()));
    }
    if pid != 0 {
        return Ok(Forked::Parent);
    }

    redirect_stdio()?;
    // SAFETY: plain syscalls without pointer arguments.
    if unsafe { libc::setsid() } < 0 {
        return Err(StartupError::Setsid(io::Error::last_os_error()));
    }
    unsafe { libc::umask(umask as libc::mode_t) };
    Ok(Forked::Child)
}

fn redirect_stdio() -> Result<(), StartupError> {
    let devnull = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(StartupError::Stdio)?;
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both descriptors are valid for the duration of the call.
        if unsafe { libc::dup2(devnull.as_raw_fd(), target) } < 0 {
            return Err(StartupError::Stdio(io::Error::last_os_error()));
        }
    }
    Ok(())
}

/// A written PID file, removed again on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id followed by a newline.
    pub fn write(path: &Path) -> Result<Self, StartupError> {
        fs::write(path, format!("{}\n", std::process::id())).map_err(|source| {
            StartupError::PidFile {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tracing::info!(pid = std::process::id(), pidfile = %path.display(), "chatserverd started");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // already gone is fine
        let _ = fs::remove_file(&self.path);
    }
}
