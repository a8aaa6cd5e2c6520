// ── sorng-sshfs / sshfs module ────────────────────────────────────────────────
//
// SFTP-backed filesystem adapter providing:
//   • One shared SSH session with a per-caller SFTP channel cache
//   • Transparent, single-flight reconnect after transport failures
//   • Create/open dispositions mapped onto stat + create-empty
//   • Ranged reads and writes with bounded buffers
//   • A virtual `:SSHFSProperty.Permission` stream for chmod
//   • Listing, metadata, time/size mutation, rename and delete
//   • Volume and free-space answers for the host driver

pub mod types;
pub mod error;
pub mod monitor;
pub mod attributes;
pub mod paths;
pub mod transport;
pub mod ssh2_transport;
pub mod connection;
pub mod service;
pub mod file_ops;
pub mod dir_ops;
pub mod volume;

#[cfg(test)]
pub(crate) mod testing;

pub use types::*;
pub use error::{FsError, FsResult, RemoteError, RemoteErrorKind, RemoteResult};
pub use connection::ConnectionManager;
pub use service::SshFs;
pub use ssh2_transport::Ssh2Connector;
pub use transport::{Connector, RemoteAttrs, RemoteChannel, RemoteEntry, RemoteSession};
