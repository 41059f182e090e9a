//! Per-device ownership lock using a Unix socket.
//!
//! The matrix's serial-over-IP port handles one client well. Two bridges
//! polling the same matrix interleave replies, so each process takes a lock
//! per `host:port` before connecting. The OS drops the socket when the process
//! dies, so crashes leave no stale lock behind.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceLockError {
    /// Another bridge already owns this device.
    #[error("another bridge is already controlling {0}")]
    AlreadyRunning(String),

    #[error("failed to acquire device lock: {0}")]
    Io(#[from] io::Error),
}

/// Held for as long as this process talks to the device. Dropping it removes
/// the socket file.
#[derive(Debug)]
pub struct DeviceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl DeviceLock {
    /// Lock `host:port` in the runtime directory.
    pub fn acquire(host: &str, port: u16) -> Result<Self, DeviceLockError> {
        Self::acquire_in(&runtime_dir(), host, port)
    }

    pub fn acquire_in(dir: &Path, host: &str, port: u16) -> Result<Self, DeviceLockError> {
        let path = socket_path_in(dir, host, port);
        let device = format!("{}:{}", host, port);

        if path.exists() {
            match UnixStream::connect(&path) {
                Ok(_) => return Err(DeviceLockError::AlreadyRunning(device)),
                // Nobody listening: left over from a killed process.
                Err(_) => {
                    let _ = std::fs::remove_file(&path);
                }
            }
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
            }),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                Err(DeviceLockError::AlreadyRunning(device))
            }
            Err(e) => Err(DeviceLockError::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// `XDG_RUNTIME_DIR` if set, else `/tmp`.
pub fn runtime_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Socket file for one device. Anything outside `[A-Za-z0-9.-]` in the host
/// becomes `_`.
pub fn socket_path_in(dir: &Path, host: &str, port: u16) -> PathBuf {
    let host: String = host
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("blackbird-bridge-{}-{}.sock", host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "blackbird-lock-test-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_socket_path_sanitizes_host() {
        let path = socket_path_in(Path::new("/run/user/1000"), "fe80::1%eth0", 4001);
        assert_eq!(
            path,
            PathBuf::from("/run/user/1000/blackbird-bridge-fe80__1_eth0-4001.sock")
        );
        let path = socket_path_in(Path::new("/tmp"), "matrix.lan", 23);
        assert_eq!(path, PathBuf::from("/tmp/blackbird-bridge-matrix.lan-23.sock"));
    }

    #[test]
    fn test_second_lock_for_same_device_fails() {
        let dir = scratch_dir("same");
        let lock = DeviceLock::acquire_in(&dir, "10.0.0.50", 4001).unwrap();
        assert!(lock.path().exists());

        let err = DeviceLock::acquire_in(&dir, "10.0.0.50", 4001).unwrap_err();
        assert!(matches!(err, DeviceLockError::AlreadyRunning(ref d) if d == "10.0.0.50:4001"));

        // A different device is independent.
        let _other = DeviceLock::acquire_in(&dir, "10.0.0.51", 4001).unwrap();

        let path = lock.path().to_path_buf();
        drop(lock);
        assert!(!path.exists());
        assert!(DeviceLock::acquire_in(&dir, "10.0.0.50", 4001).is_ok());
    }

    #[test]
    fn test_stale_socket_is_replaced() {
        let dir = scratch_dir("stale");
        let path = socket_path_in(&dir, "10.0.0.60", 4001);
        // Bind then forget the listener without running Drop for a lock.
        drop(UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let lock = DeviceLock::acquire_in(&dir, "10.0.0.60", 4001).unwrap();
        assert_eq!(lock.path(), path.as_path());
    }
}
