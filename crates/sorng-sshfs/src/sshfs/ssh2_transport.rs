// ── ssh2 transport – libssh2-backed sessions and SFTP channels ───────────────

use crate::sshfs::error::{RemoteError, RemoteResult};
use crate::sshfs::monitor::ProgressMonitor;
use crate::sshfs::transport::{Connector, RemoteAttrs, RemoteChannel, RemoteEntry, RemoteSession};
use crate::sshfs::types::{HostKeyPolicy, MountConfig};
use log::{debug, info, warn};
use ssh2::{CheckResult, ErrorCode, FileStat, KnownHostFileKind, OpenFlags, OpenType, RenameFlags, Session, Sftp};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const CHUNK_SIZE: usize = 32 * 1024;

// SFTP status codes (draft-ietf-secsh-filexfer-02 and later).
const SSH_FX_NO_SUCH_FILE: i32 = 2;
const SSH_FX_PERMISSION_DENIED: i32 = 3;
const SSH_FX_NO_CONNECTION: i32 = 6;
const SSH_FX_CONNECTION_LOST: i32 = 7;
const SSH_FX_FILE_ALREADY_EXISTS: i32 = 11;

impl From<ssh2::Error> for RemoteError {
    fn from(e: ssh2::Error) -> Self {
        classify(&e)
    }
}

fn classify(e: &ssh2::Error) -> RemoteError {
    let msg = e.message().to_string();
    match e.code() {
        ErrorCode::SFTP(SSH_FX_NO_SUCH_FILE) => RemoteError::no_such_file(msg),
        ErrorCode::SFTP(SSH_FX_PERMISSION_DENIED) => RemoteError::permission_denied(msg),
        ErrorCode::SFTP(SSH_FX_FILE_ALREADY_EXISTS) => RemoteError::already_exists(msg),
        ErrorCode::SFTP(SSH_FX_NO_CONNECTION) | ErrorCode::SFTP(SSH_FX_CONNECTION_LOST) => {
            RemoteError::transport(msg)
        }
        ErrorCode::SFTP(_) => RemoteError::failure(msg),
        ErrorCode::Session(_) => RemoteError::transport(msg),
    }
}

/// `File`'s `Read`/`Write`/`Seek` impls wrap the SFTP status in an
/// `io::Error`; unwrap it so server refusals stay protocol-level.
fn stream_error(e: io::Error) -> RemoteError {
    match e.get_ref().and_then(|inner| inner.downcast_ref::<ssh2::Error>()) {
        Some(inner) => classify(inner),
        None => RemoteError::from(e),
    }
}

fn to_file_stat(attrs: RemoteAttrs) -> FileStat {
    FileStat {
        size: attrs.size,
        uid: attrs.uid,
        gid: attrs.gid,
        perm: attrs.perm,
        atime: attrs.atime,
        mtime: attrs.mtime,
    }
}

fn from_file_stat(stat: &FileStat) -> RemoteAttrs {
    RemoteAttrs {
        size: stat.size,
        uid: stat.uid,
        gid: stat.gid,
        perm: stat.perm,
        atime: stat.atime,
        mtime: stat.mtime,
    }
}

// ── Connector ────────────────────────────────────────────────────────────────

/// Opens real SSH sessions with libssh2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssh2Connector;

impl Connector for Ssh2Connector {
    fn connect(&self, config: &MountConfig) -> RemoteResult<Box<dyn RemoteSession>> {
        let addr = config.address();
        info!("SSHFS connecting to {}", addr);

        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let tcp = connect_tcp(&addr, timeout)?;

        let mut session = Session::new()?;
        if config.compress {
            session.set_compress(true);
        }
        session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp.try_clone()?);
        session
            .handshake()
            .map_err(|e| RemoteError::from(e).context("SSH handshake", &addr))?;

        check_host_key(&session, config)?;

        let auth_method = authenticate(&mut session, config)?;
        if !session.authenticated() {
            return Err(RemoteError::transport(
                "Authentication failed – not authenticated after auth attempt",
            ));
        }
        info!("SSHFS authenticated to {} via {}", addr, auth_method);

        let keepalive = config.keepalive_interval_secs;
        session.set_keepalive(keepalive > 0, u32::try_from(keepalive).unwrap_or(u32::MAX));

        Ok(Box::new(Ssh2Session {
            session,
            _tcp: tcp,
        }))
    }
}

fn connect_tcp(addr: &str, timeout: Duration) -> RemoteResult<TcpStream> {
    let targets: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|e| RemoteError::transport(format!("Invalid address '{}': {}", addr, e)))?
        .collect();

    let mut last_err = None;
    for target in targets {
        match TcpStream::connect_timeout(&target, timeout) {
            Ok(tcp) => {
                tcp.set_nonblocking(false)?;
                return Ok(tcp);
            }
            Err(e) => {
                debug!("TCP connect to {} failed: {}", target, e);
                last_err = Some(e);
            }
        }
    }
    Err(RemoteError::transport(match last_err {
        Some(e) => format!("TCP connection to {} failed: {}", addr, e),
        None => format!("No addresses resolved for {}", addr),
    }))
}

fn check_host_key(session: &Session, config: &MountConfig) -> RemoteResult<()> {
    if config.host_key_policy == HostKeyPolicy::Ignore {
        debug!("Host key verification disabled for {}", config.host);
        return Ok(());
    }

    let (key, _) = session
        .host_key()
        .ok_or_else(|| RemoteError::transport("Server presented no host key"))?;
    let mut known_hosts = session.known_hosts()?;
    let file = dirs::home_dir()
        .map(|h| h.join(".ssh").join("known_hosts"))
        .ok_or_else(|| RemoteError::transport("Cannot locate ~/.ssh/known_hosts"))?;
    known_hosts
        .read_file(&file, KnownHostFileKind::OpenSSH)
        .map_err(|e| RemoteError::from(e).context("read known_hosts", &file.to_string_lossy()))?;

    match known_hosts.check_port(&config.host, config.port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::Mismatch => Err(RemoteError::transport(format!(
            "Host key for {} does not match known_hosts",
            config.host
        ))),
        CheckResult::NotFound => Err(RemoteError::transport(format!(
            "Host {} is not in known_hosts",
            config.host
        ))),
        CheckResult::Failure => Err(RemoteError::transport("Host key check failed")),
    }
}

// ── Authentication helpers ───────────────────────────────────────────────────

fn authenticate(session: &mut Session, config: &MountConfig) -> RemoteResult<String> {
    // 1. Private-key file
    if let Some(ref key_path) = config.private_key_path {
        let passphrase = config.private_key_passphrase.as_deref();
        match session.userauth_pubkey_file(&config.username, None, Path::new(key_path), passphrase) {
            Ok(()) if session.authenticated() => return Ok("publickey".to_string()),
            Ok(()) => {}
            Err(e) => warn!("Public-key auth with {} failed: {}", key_path, e),
        }
    }

    // 2. Password / keyboard-interactive
    if let Some(ref password) = config.password {
        if session.userauth_password(&config.username, password).is_ok()
            && session.authenticated()
        {
            return Ok("password".to_string());
        }

        struct SimpleKbdHandler {
            password: String,
        }

        impl ssh2::KeyboardInteractivePrompt for SimpleKbdHandler {
            fn prompt(
                &mut self,
                _username: &str,
                _instructions: &str,
                prompts: &[ssh2::Prompt],
            ) -> Vec<String> {
                prompts.iter().map(|_| self.password.clone()).collect()
            }
        }

        let mut handler = SimpleKbdHandler {
            password: password.clone(),
        };
        if session
            .userauth_keyboard_interactive(&config.username, &mut handler)
            .is_ok()
            && session.authenticated()
        {
            return Ok("keyboard-interactive".to_string());
        }
    }

    Err(RemoteError::transport("No authentication method succeeded"))
}

// ── Session ──────────────────────────────────────────────────────────────────

pub struct Ssh2Session {
    session: Session,
    // held to keep the TCP connection alive
    _tcp: TcpStream,
}

impl RemoteSession for Ssh2Session {
    fn open_channel(&self) -> RemoteResult<Arc<dyn RemoteChannel>> {
        let sftp = self.session.sftp()?;
        Ok(Arc::new(Ssh2Channel {
            sftp: Mutex::new(Some(sftp)),
        }))
    }

    fn disconnect(&self) -> RemoteResult<()> {
        self.session.disconnect(None, "Unmounting", None)?;
        Ok(())
    }
}

// ── Channel ──────────────────────────────────────────────────────────────────

pub struct Ssh2Channel {
    sftp: Mutex<Option<Sftp>>,
}

impl Ssh2Channel {
    fn guard(&self) -> MutexGuard<'_, Option<Sftp>> {
        self.sftp.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_sftp<T>(&self, f: impl FnOnce(&Sftp) -> RemoteResult<T>) -> RemoteResult<T> {
        let guard = self.guard();
        let sftp = guard
            .as_ref()
            .ok_or_else(|| RemoteError::transport("SFTP channel is disconnected"))?;
        f(sftp)
    }
}

impl RemoteChannel for Ssh2Channel {
    fn stat(&self, path: &str) -> RemoteResult<RemoteAttrs> {
        self.with_sftp(|sftp| Ok(from_file_stat(&sftp.stat(Path::new(path))?)))
    }

    fn setstat(&self, path: &str, attrs: RemoteAttrs) -> RemoteResult<()> {
        self.with_sftp(|sftp| Ok(sftp.setstat(Path::new(path), to_file_stat(attrs))?))
    }

    fn get(
        &self,
        path: &str,
        offset: u64,
        sink: &mut dyn Write,
        monitor: &mut dyn ProgressMonitor,
    ) -> RemoteResult<u64> {
        self.with_sftp(|sftp| {
            let mut file = sftp.open(Path::new(path))?;
            if offset > 0 {
                file.seek(SeekFrom::Start(offset)).map_err(stream_error)?;
            }

            monitor.init(path, offset);
            let mut chunk = vec![0u8; CHUNK_SIZE];
            let mut total: u64 = 0;
            loop {
                let n = file.read(&mut chunk).map_err(stream_error)?;
                if n == 0 {
                    break;
                }
                sink.write_all(&chunk[..n])?;
                total += n as u64;
                if !monitor.count(n as u64) {
                    break;
                }
            }
            monitor.end();
            Ok(total)
        })
    }

    fn put(
        &self,
        path: &str,
        offset: u64,
        data: &[u8],
        monitor: &mut dyn ProgressMonitor,
    ) -> RemoteResult<()> {
        self.with_sftp(|sftp| {
            let mut file = sftp.open_mode(
                Path::new(path),
                OpenFlags::WRITE | OpenFlags::CREATE,
                0o644,
                OpenType::File,
            )?;
            if offset > 0 {
                file.seek(SeekFrom::Start(offset)).map_err(stream_error)?;
            }

            monitor.init(path, offset);
            for chunk in data.chunks(CHUNK_SIZE) {
                file.write_all(chunk).map_err(stream_error)?;
                if !monitor.count(chunk.len() as u64) {
                    break;
                }
            }
            file.flush().map_err(stream_error)?;
            monitor.end();
            Ok(())
        })
    }

    fn create_empty(&self, path: &str) -> RemoteResult<()> {
        self.with_sftp(|sftp| {
            let _file = sftp.create(Path::new(path))?;
            Ok(())
        })
    }

    fn mkdir(&self, path: &str, mode: u32) -> RemoteResult<()> {
        let mode = i32::try_from(mode).unwrap_or(0o755);
        self.with_sftp(|sftp| Ok(sftp.mkdir(Path::new(path), mode)?))
    }

    fn rmdir(&self, path: &str) -> RemoteResult<()> {
        self.with_sftp(|sftp| Ok(sftp.rmdir(Path::new(path))?))
    }

    fn remove(&self, path: &str) -> RemoteResult<()> {
        self.with_sftp(|sftp| Ok(sftp.unlink(Path::new(path))?))
    }

    fn rename(&self, from: &str, to: &str, overwrite: bool) -> RemoteResult<()> {
        let flags = if overwrite {
            RenameFlags::OVERWRITE | RenameFlags::ATOMIC | RenameFlags::NATIVE
        } else {
            RenameFlags::ATOMIC
        };
        self.with_sftp(|sftp| Ok(sftp.rename(Path::new(from), Path::new(to), Some(flags))?))
    }

    fn readdir(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        self.with_sftp(|sftp| {
            let entries = sftp.readdir(Path::new(path))?;
            Ok(entries
                .into_iter()
                .filter_map(|(entry_path, stat)| {
                    let name = entry_path.file_name()?.to_string_lossy().to_string();
                    Some(RemoteEntry {
                        name,
                        attrs: from_file_stat(&stat),
                    })
                })
                .collect())
        })
    }

    fn exit(&self) {
        if let Some(sftp) = self.guard().as_mut() {
            if let Err(e) = sftp.shutdown() {
                debug!("SFTP shutdown failed: {}", e);
            }
        }
    }

    fn disconnect(&self) {
        self.guard().take();
    }

    fn is_connected(&self) -> bool {
        self.guard().is_some()
    }
}
