// ── SshFs – file operations ──────────────────────────────────────────────────

use crate::sshfs::attributes::{
    datetime_to_epoch, format_permission_octal, format_permissions, parse_permission_octal,
    to_metadata,
};
use crate::sshfs::error::{FsError, FsResult, RemoteErrorKind};
use crate::sshfs::monitor::{BoundedSink, CountingMonitor, ReadLimitMonitor};
use crate::sshfs::paths::{file_name, ResolvedPath};
use crate::sshfs::service::SshFs;
use crate::sshfs::transport::{RemoteAttrs, S_IFMT};
use crate::sshfs::types::{FileAttributes, FileContext, FileMetadata};
use chrono::{DateTime, Utc};
use log::{debug, warn};

impl SshFs {
    // ── Permission stream ────────────────────────────────────────────────

    /// Octal permission text for `remote`, or an empty string when the
    /// file cannot be stat'ed.
    fn read_permission(&self, ctx: &FileContext, remote: &str) -> String {
        match self.with_channel(ctx, "stat", remote, |ch| ch.stat(remote)) {
            Ok(attrs) => {
                debug!(
                    "Permission of {}: {}",
                    remote,
                    format_permissions(attrs.perm.unwrap_or(0))
                );
                format_permission_octal(attrs.permission_bits())
            }
            Err(_) => String::new(),
        }
    }

    /// Best-effort chmod. Unparsable text and remote failures are logged
    /// and otherwise ignored.
    fn write_permission(&self, ctx: &FileContext, remote: &str, data: &[u8]) {
        let bits = match parse_permission_octal(&String::from_utf8_lossy(data)) {
            Ok(bits) => bits,
            Err(e) => {
                warn!("Ignoring permission write to {}: {}", remote, e);
                return;
            }
        };
        debug!("WritePermission {} {:o}", remote, bits);

        let result = self.with_channel(ctx, "chmod", remote, |ch| {
            let attrs = ch.stat(remote)?;
            let type_bits = attrs.perm.unwrap_or(0) & S_IFMT;
            ch.setstat(
                remote,
                RemoteAttrs {
                    perm: Some(type_bits | bits),
                    ..Default::default()
                },
            )
        });
        if let Err(e) = result {
            warn!("Permission write to {} dropped: {}", remote, e);
        }
    }

    // ── Read / write ─────────────────────────────────────────────────────

    /// Read up to `buffer.len()` bytes at `offset`. Returns the number of
    /// bytes copied, which is short at end of file.
    pub fn read_file(
        &self,
        path: &str,
        buffer: &mut [u8],
        offset: u64,
        ctx: &FileContext,
    ) -> FsResult<usize> {
        debug!("ReadFile {} len {} offset {}", path, buffer.len(), offset);

        let remote = match self.paths.classify(path) {
            ResolvedPath::File(remote) => remote,
            ResolvedPath::PermissionStream { file } => {
                if offset != 0 {
                    return Ok(0);
                }
                let text = self.read_permission(ctx, &file);
                let n = text.len().min(buffer.len());
                buffer[..n].copy_from_slice(&text.as_bytes()[..n]);
                return Ok(n);
            }
            ResolvedPath::Stream { .. } => return Err(FsError::FileNotFound),
        };

        if ctx.is_directory {
            return Err(FsError::Generic);
        }
        if buffer.is_empty() {
            return Ok(0);
        }

        let mut monitor = ReadLimitMonitor::new(buffer.len() as u64);
        let mut sink = BoundedSink::new(buffer);
        self.with_channel(ctx, "read", &remote, |ch| {
            ch.get(&remote, offset, &mut sink, &mut monitor)
        })
        .map_err(|e| FsError::from_remote(&e))?;
        Ok(sink.received())
    }

    /// Write `data` at `offset`. Returns the number of bytes accepted.
    pub fn write_file(
        &self,
        path: &str,
        data: &[u8],
        offset: u64,
        ctx: &FileContext,
    ) -> FsResult<usize> {
        debug!("WriteFile {} len {} offset {}", path, data.len(), offset);

        let remote = match self.paths.classify(path) {
            ResolvedPath::File(remote) => remote,
            ResolvedPath::PermissionStream { file } => {
                if offset != 0 {
                    return Ok(0);
                }
                self.write_permission(ctx, &file, data);
                return Ok(data.len());
            }
            ResolvedPath::Stream { .. } => return Err(FsError::FileNotFound),
        };

        let mut monitor = CountingMonitor::default();
        self.with_channel(ctx, "write", &remote, |ch| {
            ch.put(&remote, offset, data, &mut monitor)
        })
        .map_err(|e| FsError::from_remote(&e))?;
        Ok(data.len())
    }

    pub fn flush_file_buffers(&self, path: &str, _ctx: &FileContext) -> FsResult<()> {
        debug!("FlushFileBuffers {}", path);
        Ok(())
    }

    pub fn cleanup(&self, path: &str, _ctx: &FileContext) -> FsResult<()> {
        debug!("Cleanup {}", path);
        Ok(())
    }

    pub fn close_file(&self, path: &str, _ctx: &FileContext) -> FsResult<()> {
        debug!("CloseFile {}", path);
        Ok(())
    }

    // ── Metadata ─────────────────────────────────────────────────────────

    pub fn get_file_information(&self, path: &str, ctx: &FileContext) -> FsResult<FileMetadata> {
        debug!("GetFileInformation {}", path);

        let (remote, permission_stream) = match self.paths.classify(path) {
            ResolvedPath::File(remote) => (remote, false),
            ResolvedPath::PermissionStream { file } => (file, true),
            ResolvedPath::Stream { .. } => return Err(FsError::FileNotFound),
        };

        let attrs = self
            .with_channel(ctx, "stat", &remote, |ch| ch.stat(&remote))
            .map_err(|e| FsError::from_remote(&e))?;
        let mut meta = to_metadata(file_name(path), &attrs, self.config.use_offline);

        // The stream itself is a small regular file holding the octal text.
        if permission_stream {
            meta.attributes = if self.config.use_offline {
                FileAttributes::NORMAL | FileAttributes::OFFLINE
            } else {
                FileAttributes::NORMAL
            };
            meta.length = format_permission_octal(attrs.permission_bits()).len() as u64;
        }
        Ok(meta)
    }

    /// Attribute flags have no SFTP counterpart; the file's permission bits
    /// are written back unchanged.
    pub fn set_file_attributes(
        &self,
        path: &str,
        attributes: FileAttributes,
        ctx: &FileContext,
    ) -> FsResult<()> {
        debug!("SetFileAttributes {} {:#x}", path, attributes.bits());
        let remote = self.regular_path(path)?;

        self.with_channel(ctx, "setstat", &remote, |ch| {
            let attrs = ch.stat(&remote)?;
            debug!(" permissions {}", format_permissions(attrs.perm.unwrap_or(0)));
            ch.setstat(
                &remote,
                RemoteAttrs {
                    perm: attrs.perm,
                    ..Default::default()
                },
            )
        })
        .map_err(|e| FsError::from_remote(&e))
    }

    /// Apply access and modify times. An unset time keeps the remote value.
    /// SFTP has no creation time, so `creation` is ignored.
    pub fn set_file_time(
        &self,
        path: &str,
        creation: Option<DateTime<Utc>>,
        access: Option<DateTime<Utc>>,
        modified: Option<DateTime<Utc>>,
        ctx: &FileContext,
    ) -> FsResult<()> {
        debug!(
            "SetFileTime {} {:?} {:?} {:?}",
            path, creation, access, modified
        );
        let remote = self.regular_path(path)?;

        self.with_channel(ctx, "setstat", &remote, |ch| {
            let current = ch.stat(&remote)?;
            let atime = datetime_to_epoch(access).or(current.atime).unwrap_or(0);
            let mtime = datetime_to_epoch(modified).or(current.mtime).unwrap_or(0);
            ch.setstat(
                &remote,
                RemoteAttrs {
                    atime: Some(atime),
                    mtime: Some(mtime),
                    ..Default::default()
                },
            )
        })
        .map_err(|e| FsError::from_remote(&e))
    }

    // ── Mutation ─────────────────────────────────────────────────────────

    pub fn delete_file(&self, path: &str, ctx: &FileContext) -> FsResult<()> {
        debug!("DeleteFile {}", path);
        let remote = self.regular_path(path)?;
        self.with_channel(ctx, "remove", &remote, |ch| ch.remove(&remote))
            .map_err(|e| FsError::from_remote(&e))
    }

    pub fn move_file(
        &self,
        old_path: &str,
        new_path: &str,
        replace: bool,
        ctx: &FileContext,
    ) -> FsResult<()> {
        debug!("MoveFile {} -> {} (replace {})", old_path, new_path, replace);
        let from = self.regular_path(old_path)?;
        let to = self.regular_path(new_path)?;
        self.with_channel(ctx, "rename", &from, |ch| match ch.rename(&from, &to, replace) {
            // SFTPv3 servers ignore the overwrite flag.
            Err(e)
                if replace
                    && from != to
                    && !e.is_transport()
                    && e.kind != RemoteErrorKind::NoSuchFile =>
            {
                match ch.stat(&to) {
                    Ok(target) if !target.is_dir() => {
                        debug!("Rename onto {} refused ({}), removing target first", to, e);
                        ch.remove(&to)?;
                        ch.rename(&from, &to, false)
                    }
                    _ => Err(e),
                }
            }
            other => other,
        })
        .map_err(|e| FsError::from_remote(&e))
    }

    /// Truncate or extend the file to exactly `length` bytes.
    pub fn set_end_of_file(&self, path: &str, length: u64, ctx: &FileContext) -> FsResult<()> {
        debug!("SetEndOfFile {} {}", path, length);
        let remote = self.regular_path(path)?;
        self.with_channel(ctx, "truncate", &remote, |ch| {
            ch.setstat(
                &remote,
                RemoteAttrs {
                    size: Some(length),
                    ..Default::default()
                },
            )
        })
        .map_err(|e| FsError::from_remote(&e))
    }

    /// Grow the file to `length` bytes. Never shrinks.
    pub fn set_allocation_size(&self, path: &str, length: u64, ctx: &FileContext) -> FsResult<()> {
        debug!("SetAllocationSize {} {}", path, length);
        let remote = self.regular_path(path)?;
        self.with_channel(ctx, "allocate", &remote, |ch| {
            let current = ch.stat(&remote)?;
            if current.size.unwrap_or(0) >= length {
                return Ok(());
            }
            ch.setstat(
                &remote,
                RemoteAttrs {
                    size: Some(length),
                    ..Default::default()
                },
            )
        })
        .map_err(|e| FsError::from_remote(&e))
    }

    pub fn lock_file(&self, path: &str, offset: u64, length: u64, _ctx: &FileContext) -> FsResult<()> {
        debug!("LockFile {} {}+{}", path, offset, length);
        Ok(())
    }

    pub fn unlock_file(
        &self,
        path: &str,
        offset: u64,
        length: u64,
        _ctx: &FileContext,
    ) -> FsResult<()> {
        debug!("UnlockFile {} {}+{}", path, offset, length);
        Ok(())
    }
}
