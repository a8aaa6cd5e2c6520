//! # SortOfRemote NG – SSHFS
//!
//! Exposes a remote SFTP server as a mountable filesystem. The host driver
//! framework calls into [`sshfs::SshFs`] from arbitrary worker threads;
//! each call is answered over SFTP:
//!   • Shared SSH session, one SFTP channel per caller
//!   • Reconnect after transport failures, one attempt per failure episode
//!   • Create/open dispositions, ranged read/write, permission stream
//!   • Directory listing, metadata, rename, delete, truncate/grow
//!   • Pluggable transport (`ssh2` in production)

pub mod sshfs;
