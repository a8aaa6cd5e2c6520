//! Two-tier error model.
//!
//! [`RemoteError`] is what the transport seam reports. Its kind separates
//! protocol rejections (the server answered, and said no) from transport
//! failures (the connection itself broke). Only the latter trigger the
//! reconnect path. [`FsError`] is the small status vocabulary handed back to
//! the host driver.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised remote error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// SFTP `NO_SUCH_FILE`.
    NoSuchFile,
    /// SFTP `PERMISSION_DENIED`.
    PermissionDenied,
    /// SFTP `FILE_ALREADY_EXISTS`.
    AlreadyExists,
    /// Any other status the server answered with.
    Failure,
    /// Connection dropped, handshake/auth failure, or I/O below the
    /// protocol layer.
    Transport,
}

pub type RemoteResult<T> = Result<T, RemoteError>;

// ── Construction helpers ─────────────────────────────────────────────

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn no_such_file(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NoSuchFile, msg)
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::PermissionDenied, msg)
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::AlreadyExists, msg)
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Failure, msg)
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transport, msg)
    }

    /// True for failures below the SFTP protocol layer.
    pub fn is_transport(&self) -> bool {
        self.kind == RemoteErrorKind::Transport
    }

    /// Prefix the message with the operation and path it belongs to.
    pub fn context(mut self, op: &str, path: &str) -> Self {
        self.message = format!("{} '{}' failed: {}", op, path, self.message);
        self
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[SFTP {:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteError {}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::NotFound => Self::no_such_file(e.to_string()),
            ErrorKind::PermissionDenied => Self::permission_denied(e.to_string()),
            ErrorKind::AlreadyExists => Self::already_exists(e.to_string()),
            _ => Self::transport(e.to_string()),
        }
    }
}

impl From<RemoteError> for String {
    fn from(e: RemoteError) -> String {
        e.message
    }
}

// ── Driver-facing status ─────────────────────────────────────────────

/// Status returned to the host driver for a failed call. Success is `Ok`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FsError {
    FileNotFound,
    PathNotFound,
    AlreadyExists,
    Generic,
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Translate a remote error for a file-level call.
    pub fn from_remote(e: &RemoteError) -> Self {
        match e.kind {
            RemoteErrorKind::NoSuchFile => FsError::FileNotFound,
            RemoteErrorKind::AlreadyExists => FsError::AlreadyExists,
            _ => FsError::Generic,
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FsError::FileNotFound => "file not found",
            FsError::PathNotFound => "path not found",
            FsError::AlreadyExists => "already exists",
            FsError::Generic => "error",
        };
        f.write_str(s)
    }
}

impl std::error::Error for FsError {}
