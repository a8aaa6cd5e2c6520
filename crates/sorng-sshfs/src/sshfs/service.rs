// ── SshFs – operation dispatcher ─────────────────────────────────────────────
//
// Entry point for every filesystem callback. Each call resolves the driver
// path, borrows the caller's channel from the connection manager, and maps
// remote results onto the driver's status codes. The callback surface is
// split across `file_ops.rs`, `dir_ops.rs` and `volume.rs`.

use crate::sshfs::connection::ConnectionManager;
use crate::sshfs::error::{FsError, FsResult, RemoteError, RemoteResult};
use crate::sshfs::paths::{is_virtual_permission_stream, PathTranslator, ResolvedPath};
use crate::sshfs::ssh2_transport::Ssh2Connector;
use crate::sshfs::transport::{Connector, RemoteAttrs, RemoteChannel};
use crate::sshfs::types::{Disposition, FileContext, MountConfig};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

pub struct SshFs {
    pub(crate) config: MountConfig,
    pub(crate) paths: PathTranslator,
    connection: Arc<ConnectionManager>,
}

impl SshFs {
    pub fn new(config: MountConfig, connector: Arc<dyn Connector>) -> Self {
        let paths = PathTranslator::new(&config.root);
        let connection = Arc::new(ConnectionManager::new(config.clone(), connector));
        Self {
            config,
            paths,
            connection,
        }
    }

    /// Adapter backed by a real SSH connection.
    pub fn with_ssh2(config: MountConfig) -> Self {
        Self::new(config, Arc::new(Ssh2Connector))
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Open the initial session. Must succeed before the volume is handed
    /// to the driver.
    pub fn connect(&self) -> RemoteResult<()> {
        self.config.validate().map_err(RemoteError::failure)?;
        self.connection.connect()
    }

    // ── Remote call plumbing ─────────────────────────────────────────────

    /// Run `f` on the caller's channel. Transport failures flag the
    /// connection and reconnect before the error is handed back.
    pub(crate) fn with_channel<T>(
        &self,
        ctx: &FileContext,
        op: &str,
        path: &str,
        f: impl FnOnce(&dyn RemoteChannel) -> RemoteResult<T>,
    ) -> RemoteResult<T> {
        let lease = match self.connection.acquire_channel(ctx.caller) {
            Ok(lease) => lease,
            Err(e) => {
                let e = e.context(op, path);
                self.handle_failure(None, &e);
                return Err(e);
            }
        };

        f(lease.channel.as_ref()).map_err(|e| {
            let e = e.context(op, path);
            self.handle_failure(Some(lease.generation), &e);
            e
        })
    }

    fn handle_failure(&self, generation: Option<u64>, e: &RemoteError) {
        if !e.is_transport() {
            debug!("{}", e);
            return;
        }
        warn!("{}", e);
        self.connection.report_transport_failure(generation);
        if let Err(re) = self.connection.reconnect() {
            warn!("Reconnect failed: {}", re);
        }
    }

    /// Stat used for existence checks. Any protocol-level failure reads as
    /// "absent"; transport failures surface as a generic error.
    pub(crate) fn probe(&self, ctx: &FileContext, remote: &str) -> FsResult<Option<RemoteAttrs>> {
        match self.with_channel(ctx, "stat", remote, |ch| ch.stat(remote)) {
            Ok(attrs) => Ok(Some(attrs)),
            Err(e) if e.is_transport() => Err(FsError::Generic),
            Err(_) => Ok(None),
        }
    }

    /// Remote path of a regular file. Stream paths are not addressable by
    /// mutation calls.
    pub(crate) fn regular_path(&self, path: &str) -> FsResult<String> {
        match self.paths.classify(path) {
            ResolvedPath::File(remote) => Ok(remote),
            _ => Err(FsError::FileNotFound),
        }
    }

    fn create_empty(&self, ctx: &FileContext, remote: &str) -> FsResult<()> {
        self.with_channel(ctx, "create", remote, |ch| ch.create_empty(remote))
            .map_err(|e| FsError::from_remote(&e))
    }

    // ── Create / open ────────────────────────────────────────────────────

    /// Apply `disposition` to `path`. On success `ctx.is_directory` tells
    /// whether the path is an existing directory.
    pub fn create_file(
        &self,
        path: &str,
        disposition: Disposition,
        ctx: &mut FileContext,
    ) -> FsResult<()> {
        debug!("CreateFile {} ({:?})", path, disposition);
        ctx.is_directory = false;

        if is_virtual_permission_stream(path) {
            return Ok(());
        }
        let remote = match self.paths.classify(path) {
            ResolvedPath::File(remote) => remote,
            _ => return Ok(()),
        };

        if disposition == Disposition::Create {
            return self.create_empty(ctx, &remote);
        }

        let existing = self.probe(ctx, &remote)?;
        if let Some(attrs) = &existing {
            ctx.is_directory = attrs.is_dir();
        }

        match (disposition, existing.is_some()) {
            (Disposition::Open, true) => Ok(()),
            (Disposition::Open, false) => Err(FsError::FileNotFound),
            (Disposition::CreateNew, true) => Err(FsError::AlreadyExists),
            (Disposition::Truncate, false) => Err(FsError::FileNotFound),
            (Disposition::Truncate, true) => self.create_empty(ctx, &remote),
            (Disposition::OpenOrCreate | Disposition::Append, true) => Ok(()),
            (Disposition::CreateNew | Disposition::OpenOrCreate | Disposition::Append, false)
            | (Disposition::Create, _) => self.create_empty(ctx, &remote),
        }
    }

    // ── Unmount ──────────────────────────────────────────────────────────

    /// Tear the connection down. Always succeeds.
    pub fn unmount(&self) -> FsResult<()> {
        info!("Unmount {}", self.config.address());
        self.connection
            .shutdown(Duration::from_millis(self.config.unmount_drain_ms));
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{mounted, remote_path};
    use super::*;

    fn run(disposition: Disposition, exists: bool) -> (FsResult<()>, Option<Vec<u8>>) {
        let (fs, remote) = mounted();
        if exists {
            remote.add_file(&remote_path("f.txt"), b"payload");
        }
        let mut ctx = FileContext::new();
        let result = fs.create_file("\\f.txt", disposition, &mut ctx);
        (result, remote.file_data(&remote_path("f.txt")))
    }

    #[test]
    fn test_open_disposition() {
        assert_eq!(run(Disposition::Open, true), (Ok(()), Some(b"payload".to_vec())));
        assert_eq!(run(Disposition::Open, false), (Err(FsError::FileNotFound), None));
    }

    #[test]
    fn test_create_new_disposition() {
        assert_eq!(
            run(Disposition::CreateNew, true),
            (Err(FsError::AlreadyExists), Some(b"payload".to_vec()))
        );
        assert_eq!(run(Disposition::CreateNew, false), (Ok(()), Some(Vec::new())));
    }

    #[test]
    fn test_create_disposition_truncates() {
        assert_eq!(run(Disposition::Create, true), (Ok(()), Some(Vec::new())));
        assert_eq!(run(Disposition::Create, false), (Ok(()), Some(Vec::new())));
    }

    #[test]
    fn test_open_or_create_disposition() {
        assert_eq!(
            run(Disposition::OpenOrCreate, true),
            (Ok(()), Some(b"payload".to_vec()))
        );
        assert_eq!(run(Disposition::OpenOrCreate, false), (Ok(()), Some(Vec::new())));
    }

    #[test]
    fn test_truncate_disposition() {
        assert_eq!(run(Disposition::Truncate, true), (Ok(()), Some(Vec::new())));
        assert_eq!(run(Disposition::Truncate, false), (Err(FsError::FileNotFound), None));
    }

    #[test]
    fn test_append_disposition_leaves_existing_content() {
        assert_eq!(run(Disposition::Append, true), (Ok(()), Some(b"payload".to_vec())));
        assert_eq!(run(Disposition::Append, false), (Ok(()), Some(Vec::new())));
    }

    #[test]
    fn test_create_on_stream_path_is_noop() {
        let (fs, remote) = mounted();
        let mut ctx = FileContext::new();
        for path in ["\\f.txt:SSHFSProperty.Permission", "\\f.txt:Zone.Identifier"] {
            assert_eq!(fs.create_file(path, Disposition::Open, &mut ctx), Ok(()));
            assert_eq!(fs.create_file(path, Disposition::Create, &mut ctx), Ok(()));
        }
        assert!(!remote.exists(&remote_path("f.txt")));
    }

    #[test]
    fn test_open_reports_directory() {
        let (fs, remote) = mounted();
        remote.add_dir(&remote_path("sub"));
        let mut ctx = FileContext::new();
        fs.create_file("\\sub", Disposition::Open, &mut ctx).unwrap();
        assert!(ctx.is_directory);

        remote.add_file(&remote_path("plain"), b"");
        fs.create_file("\\plain", Disposition::Open, &mut ctx).unwrap();
        assert!(!ctx.is_directory);
    }

    #[test]
    fn test_open_root() {
        let (fs, _remote) = mounted();
        let mut ctx = FileContext::new();
        fs.create_file("\\", Disposition::Open, &mut ctx).unwrap();
        assert!(ctx.is_directory);
    }

    #[test]
    fn test_transport_failure_reconnects_and_returns_generic() {
        let (fs, remote) = mounted();
        remote.add_file(&remote_path("f.txt"), b"x");
        let mut ctx = FileContext::new();
        fs.create_file("\\f.txt", Disposition::Open, &mut ctx).unwrap();

        remote.drop_connections();
        assert_eq!(
            fs.create_file("\\f.txt", Disposition::Open, &mut ctx),
            Err(FsError::Generic)
        );
        assert_eq!(fs.connection().retry_count(), 1);
        assert!(!fs.connection().connection_error());
        assert_eq!(remote.connect_count(), 2);

        assert_eq!(fs.create_file("\\f.txt", Disposition::Open, &mut ctx), Ok(()));
    }

    #[test]
    fn test_protocol_failure_does_not_reconnect() {
        let (fs, _remote) = mounted();
        let mut ctx = FileContext::new();
        assert_eq!(
            fs.create_file("\\missing", Disposition::Open, &mut ctx),
            Err(FsError::FileNotFound)
        );
        assert_eq!(fs.connection().retry_count(), 0);
    }

    #[test]
    fn test_concurrent_callers_reconnect_once() {
        const CALLERS: usize = 6;
        let (fs, remote) = mounted();
        remote.add_file(&remote_path("f.txt"), b"x");

        let warmed = std::sync::Barrier::new(CALLERS);
        let dropped = std::sync::Barrier::new(CALLERS);
        std::thread::scope(|s| {
            for i in 0..CALLERS {
                let (fs, remote) = (&fs, &remote);
                let (warmed, dropped) = (&warmed, &dropped);
                s.spawn(move || {
                    let mut ctx = FileContext::new();
                    fs.create_file("\\f.txt", Disposition::Open, &mut ctx).unwrap();
                    warmed.wait();
                    if i == 0 {
                        remote.drop_connections();
                    }
                    dropped.wait();
                    let _ = fs.create_file("\\f.txt", Disposition::Open, &mut ctx);
                    fs.create_file("\\f.txt", Disposition::Open, &mut ctx).unwrap();
                });
            }
        });

        assert_eq!(remote.connect_count(), 2);
        assert_eq!(fs.connection().retry_count(), 1);
        assert!(!fs.connection().connection_error());
    }

    #[test]
    fn test_unmount_always_succeeds() {
        let (fs, remote) = mounted();
        let mut ctx = FileContext::new();
        fs.create_file("\\", Disposition::Open, &mut ctx).unwrap();

        remote.drop_connections();
        assert_eq!(fs.unmount(), Ok(()));
        assert!(!fs.connection().is_connected());
        assert_eq!(fs.unmount(), Ok(()));
    }

    #[test]
    fn test_connect_rejects_invalid_config() {
        let fs = SshFs::new(
            MountConfig::new("mem", "tester"),
            Arc::new(crate::sshfs::testing::MemoryConnector {
                remote: crate::sshfs::testing::MemoryRemote::new(),
            }),
        );
        assert!(fs.connect().is_err());
    }
}
