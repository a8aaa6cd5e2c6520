// ── Types ─────────────────────────────────────────────────────────────────────

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicU64, Ordering};

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_ssh_port() -> u16 {
    22
}
fn default_false() -> bool {
    false
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_keepalive_secs() -> u64 {
    60
}
fn default_unmount_drain_ms() -> u64 {
    1000
}
fn default_disk_total_bytes() -> u64 {
    20 * 1024 * 1024 * 1024
}
fn default_disk_free_bytes() -> u64 {
    10 * 1024 * 1024 * 1024
}

// ── Mount configuration ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub private_key_passphrase: Option<String>,
    /// Remote directory the mount is rooted at. Empty means `/`.
    #[serde(default)]
    pub root: String,
    #[serde(default = "default_false")]
    pub debug: bool,
    /// Report every entry with the offline attribute so the host OS does
    /// not eagerly fetch content for previews.
    #[serde(default = "default_false")]
    pub use_offline: bool,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default)]
    pub compress: bool,
    #[serde(default = "default_unmount_drain_ms")]
    pub unmount_drain_ms: u64,
    #[serde(default)]
    pub volume_label: Option<String>,
    #[serde(default = "default_disk_total_bytes")]
    pub disk_total_bytes: u64,
    #[serde(default = "default_disk_free_bytes")]
    pub disk_free_bytes: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum HostKeyPolicy {
    /// Accept any host key.
    #[default]
    Ignore,
    /// Require a matching entry in `~/.ssh/known_hosts`.
    Strict,
}

impl MountConfig {
    /// Minimal config with every optional field at its default.
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ssh_port(),
            username: username.into(),
            password: None,
            private_key_path: None,
            private_key_passphrase: None,
            root: String::new(),
            debug: false,
            use_offline: false,
            host_key_policy: HostKeyPolicy::default(),
            timeout_secs: default_timeout_secs(),
            keepalive_interval_secs: default_keepalive_secs(),
            compress: false,
            unmount_drain_ms: default_unmount_drain_ms(),
            volume_label: None,
            disk_total_bytes: default_disk_total_bytes(),
            disk_free_bytes: default_disk_free_bytes(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".into());
        }
        if self.username.trim().is_empty() {
            return Err("username must not be empty".into());
        }
        if self.password.is_none() && self.private_key_path.is_none() {
            return Err("either a password or a private key path is required".into());
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Caller identity ──────────────────────────────────────────────────────────

static NEXT_CALLER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_CALLER_ID: CallerId =
        CallerId(NEXT_CALLER_ID.fetch_add(1, Ordering::Relaxed));
}

/// Key of the per-caller channel cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallerId(pub u64);

impl CallerId {
    /// Token for the calling worker thread, stable for its lifetime.
    pub fn current() -> Self {
        THREAD_CALLER_ID.with(|id| *id)
    }
}

/// Per-call context supplied by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileContext {
    pub caller: CallerId,
    /// Set by `create_file` when the path turned out to be a directory.
    pub is_directory: bool,
}

impl FileContext {
    pub fn new() -> Self {
        Self::for_caller(CallerId::current())
    }

    pub fn for_caller(caller: CallerId) -> Self {
        Self {
            caller,
            is_directory: false,
        }
    }
}

impl Default for FileContext {
    fn default() -> Self {
        Self::new()
    }
}

// ── Create dispositions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Disposition {
    Open,
    CreateNew,
    Create,
    OpenOrCreate,
    Truncate,
    Append,
}

// ── File attributes ──────────────────────────────────────────────────────────

/// Native attribute flag set (values follow `FILE_ATTRIBUTE_*`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes(pub u32);

impl FileAttributes {
    pub const READONLY: FileAttributes = FileAttributes(0x0001);
    pub const HIDDEN: FileAttributes = FileAttributes(0x0002);
    pub const DIRECTORY: FileAttributes = FileAttributes(0x0010);
    pub const NORMAL: FileAttributes = FileAttributes(0x0080);
    pub const OFFLINE: FileAttributes = FileAttributes(0x1000);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: FileAttributes) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FileAttributes {
    type Output = FileAttributes;

    fn bitor(self, rhs: FileAttributes) -> FileAttributes {
        FileAttributes(self.0 | rhs.0)
    }
}

impl BitOrAssign for FileAttributes {
    fn bitor_assign(&mut self, rhs: FileAttributes) {
        self.0 |= rhs.0;
    }
}

/// Metadata record handed to the driver. Recomputed on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub file_name: String,
    pub attributes: FileAttributes,
    pub creation_time: DateTime<Utc>,
    pub last_access_time: DateTime<Utc>,
    pub last_write_time: DateTime<Utc>,
    pub length: u64,
}

impl FileMetadata {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }

    pub fn is_hidden(&self) -> bool {
        self.attributes.contains(FileAttributes::HIDDEN)
    }
}

// ── Volume ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpace {
    pub free_bytes_available: u64,
    pub total_bytes: u64,
    pub total_free_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    pub volume_label: String,
    pub file_system_name: String,
    pub case_sensitive_search: bool,
    pub case_preserved_names: bool,
    pub unicode_on_disk: bool,
    pub max_component_length: u32,
}
