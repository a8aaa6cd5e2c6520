// ── Transport seam ───────────────────────────────────────────────────────────
//
// The narrow interface the adapter needs from an SSH/SFTP library. The
// production implementation lives in `ssh2_transport`; tests run against the
// in-memory remote in `testing`.

use crate::sshfs::error::RemoteResult;
use crate::sshfs::monitor::ProgressMonitor;
use crate::sshfs::types::MountConfig;
use std::io::Write;
use std::sync::Arc;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;

/// Remote file attributes, shaped like an SFTP `ATTRS` block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteAttrs {
    pub size: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub perm: Option<u32>,
    pub atime: Option<u64>,
    pub mtime: Option<u64>,
}

impl RemoteAttrs {
    pub fn is_dir(&self) -> bool {
        self.perm.map(|p| p & S_IFMT == S_IFDIR).unwrap_or(false)
    }

    /// Permission bits without the file-type bits.
    pub fn permission_bits(&self) -> u32 {
        self.perm.unwrap_or(0) & 0o7777
    }
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub attrs: RemoteAttrs,
}

/// Opens authenticated sessions.
pub trait Connector: Send + Sync {
    fn connect(&self, config: &MountConfig) -> RemoteResult<Box<dyn RemoteSession>>;
}

/// One authenticated SSH connection.
pub trait RemoteSession: Send + Sync {
    fn open_channel(&self) -> RemoteResult<Arc<dyn RemoteChannel>>;

    fn disconnect(&self) -> RemoteResult<()>;
}

/// An SFTP command context. Used by one caller at a time.
pub trait RemoteChannel: Send + Sync {
    fn stat(&self, path: &str) -> RemoteResult<RemoteAttrs>;

    fn setstat(&self, path: &str, attrs: RemoteAttrs) -> RemoteResult<()>;

    /// Stream the file from `offset` into `sink`, consulting `monitor` after
    /// every chunk. Returns the number of bytes read from the remote.
    fn get(
        &self,
        path: &str,
        offset: u64,
        sink: &mut dyn Write,
        monitor: &mut dyn ProgressMonitor,
    ) -> RemoteResult<u64>;

    /// Write `data` at `offset` without truncating the file.
    fn put(
        &self,
        path: &str,
        offset: u64,
        data: &[u8],
        monitor: &mut dyn ProgressMonitor,
    ) -> RemoteResult<()>;

    /// Create the file, or truncate it to zero length if it exists.
    fn create_empty(&self, path: &str) -> RemoteResult<()>;

    fn mkdir(&self, path: &str, mode: u32) -> RemoteResult<()>;

    fn rmdir(&self, path: &str) -> RemoteResult<()>;

    fn remove(&self, path: &str) -> RemoteResult<()>;

    fn rename(&self, from: &str, to: &str, overwrite: bool) -> RemoteResult<()>;

    fn readdir(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>>;

    /// Signal the server that this channel is about to go away.
    fn exit(&self);

    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}
