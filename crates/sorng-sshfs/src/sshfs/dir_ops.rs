// ── SshFs – directory operations ─────────────────────────────────────────────

use crate::sshfs::attributes::to_metadata;
use crate::sshfs::error::{FsError, FsResult, RemoteErrorKind};
use crate::sshfs::service::SshFs;
use crate::sshfs::types::{FileContext, FileMetadata};
use log::debug;

/// Mode for directories created through the mount.
const DIRECTORY_MODE: u32 = 0o755;

impl SshFs {
    /// List a directory. Entries come back in remote order; `.` and `..`
    /// are dropped.
    pub fn find_files(&self, path: &str, ctx: &FileContext) -> FsResult<Vec<FileMetadata>> {
        debug!("FindFiles {}", path);
        let remote = self.regular_path(path)?;

        let entries = self
            .with_channel(ctx, "readdir", &remote, |ch| ch.readdir(&remote))
            .map_err(|e| FsError::from_remote(&e))?;

        let offline = self.config.use_offline;
        Ok(entries
            .iter()
            .filter(|entry| entry.name != "." && entry.name != "..")
            .map(|entry| to_metadata(&entry.name, &entry.attrs, offline))
            .collect())
    }

    /// Succeeds only for an existing directory.
    pub fn open_directory(&self, path: &str, ctx: &FileContext) -> FsResult<()> {
        debug!("OpenDirectory {}", path);
        let remote = self.regular_path(path).map_err(|_| FsError::PathNotFound)?;
        match self.probe(ctx, &remote)? {
            Some(attrs) if attrs.is_dir() => Ok(()),
            _ => Err(FsError::PathNotFound),
        }
    }

    pub fn create_directory(&self, path: &str, ctx: &FileContext) -> FsResult<()> {
        debug!("CreateDirectory {}", path);
        let remote = self.regular_path(path)?;
        self.with_channel(ctx, "mkdir", &remote, |ch| ch.mkdir(&remote, DIRECTORY_MODE))
            .map_err(|e| match e.kind {
                RemoteErrorKind::NoSuchFile => FsError::PathNotFound,
                _ => FsError::from_remote(&e),
            })
    }

    pub fn delete_directory(&self, path: &str, ctx: &FileContext) -> FsResult<()> {
        debug!("DeleteDirectory {}", path);
        let remote = self.regular_path(path)?;
        self.with_channel(ctx, "rmdir", &remote, |ch| ch.rmdir(&remote))
            .map_err(|e| FsError::from_remote(&e))
    }
}
