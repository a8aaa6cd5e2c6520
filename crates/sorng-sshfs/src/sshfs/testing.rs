// ── In-memory remote for tests ───────────────────────────────────────────────
//
// Implements the transport seam over a path → node map. A connection drop is
// simulated by bumping the remote's generation: every session and channel
// opened under an older generation then fails with a transport error.

use crate::sshfs::error::{RemoteError, RemoteResult};
use crate::sshfs::monitor::ProgressMonitor;
use crate::sshfs::transport::{
    Connector, RemoteAttrs, RemoteChannel, RemoteEntry, RemoteSession, S_IFDIR, S_IFMT, S_IFREG,
};
use crate::sshfs::types::MountConfig;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const CHUNK: usize = 3;

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    perm: u32,
    atime: u64,
    mtime: u64,
}

impl Node {
    fn dir() -> Self {
        Node {
            data: Vec::new(),
            perm: S_IFDIR | 0o755,
            atime: 0,
            mtime: 0,
        }
    }

    fn file(data: &[u8]) -> Self {
        Node {
            data: data.to_vec(),
            perm: S_IFREG | 0o644,
            atime: 0,
            mtime: 0,
        }
    }

    fn is_dir(&self) -> bool {
        self.perm & S_IFMT == S_IFDIR
    }

    fn attrs(&self) -> RemoteAttrs {
        RemoteAttrs {
            size: Some(if self.is_dir() { 4096 } else { self.data.len() as u64 }),
            uid: Some(1000),
            gid: Some(1000),
            perm: Some(self.perm),
            atime: Some(self.atime),
            mtime: Some(self.mtime),
        }
    }
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => "/",
    }
}

/// Shared state of the fake server.
pub(crate) struct MemoryRemote {
    nodes: Mutex<BTreeMap<String, Node>>,
    generation: AtomicU64,
    connects: AtomicUsize,
    channels_opened: AtomicUsize,
    refuse_connections: AtomicBool,
    connect_delay_ms: AtomicU64,
    ignore_rename_overwrite: AtomicBool,
}

impl MemoryRemote {
    pub(crate) fn new() -> Arc<Self> {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::dir());
        Arc::new(Self {
            nodes: Mutex::new(nodes),
            generation: AtomicU64::new(0),
            connects: AtomicUsize::new(0),
            channels_opened: AtomicUsize::new(0),
            refuse_connections: AtomicBool::new(false),
            connect_delay_ms: AtomicU64::new(0),
            ignore_rename_overwrite: AtomicBool::new(false),
        })
    }

    fn nodes(&self) -> MutexGuard<'_, BTreeMap<String, Node>> {
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn add_dir(&self, path: &str) {
        self.nodes().insert(path.to_string(), Node::dir());
    }

    pub(crate) fn add_file(&self, path: &str, data: &[u8]) {
        self.nodes().insert(path.to_string(), Node::file(data));
    }

    pub(crate) fn set_times(&self, path: &str, atime: u64, mtime: u64) {
        if let Some(node) = self.nodes().get_mut(path) {
            node.atime = atime;
            node.mtime = mtime;
        }
    }

    pub(crate) fn file_data(&self, path: &str) -> Option<Vec<u8>> {
        self.nodes().get(path).map(|n| n.data.clone())
    }

    pub(crate) fn attrs(&self, path: &str) -> Option<RemoteAttrs> {
        self.nodes().get(path).map(Node::attrs)
    }

    pub(crate) fn exists(&self, path: &str) -> bool {
        self.nodes().contains_key(path)
    }

    /// Break every live session and channel.
    pub(crate) fn drop_connections(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Refuse renames onto an existing path even when overwrite is asked
    /// for, the way SFTPv3 servers do.
    pub(crate) fn ignore_rename_overwrite(&self, ignore: bool) {
        self.ignore_rename_overwrite.store(ignore, Ordering::SeqCst);
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn channels_opened(&self) -> usize {
        self.channels_opened.load(Ordering::SeqCst)
    }

    fn live(&self, generation: u64) -> RemoteResult<()> {
        if self.generation.load(Ordering::SeqCst) == generation {
            Ok(())
        } else {
            Err(RemoteError::transport("connection lost"))
        }
    }
}

// ── Connector / session ──────────────────────────────────────────────────────

pub(crate) struct MemoryConnector {
    pub(crate) remote: Arc<MemoryRemote>,
}

impl Connector for MemoryConnector {
    fn connect(&self, _config: &MountConfig) -> RemoteResult<Box<dyn RemoteSession>> {
        let delay = self.remote.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.remote.refuse_connections.load(Ordering::SeqCst) {
            return Err(RemoteError::transport("connection refused"));
        }
        self.remote.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            remote: self.remote.clone(),
            generation: self.remote.generation.load(Ordering::SeqCst),
        }))
    }
}

struct MemorySession {
    remote: Arc<MemoryRemote>,
    generation: u64,
}

impl RemoteSession for MemorySession {
    fn open_channel(&self) -> RemoteResult<Arc<dyn RemoteChannel>> {
        self.remote.live(self.generation)?;
        self.remote.channels_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryChannel {
            remote: self.remote.clone(),
            generation: self.generation,
            connected: AtomicBool::new(true),
        }))
    }

    fn disconnect(&self) -> RemoteResult<()> {
        self.remote.live(self.generation)
    }
}

// ── Channel ──────────────────────────────────────────────────────────────────

struct MemoryChannel {
    remote: Arc<MemoryRemote>,
    generation: u64,
    connected: AtomicBool,
}

impl MemoryChannel {
    fn nodes(&self) -> RemoteResult<MutexGuard<'_, BTreeMap<String, Node>>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RemoteError::transport("channel closed"));
        }
        self.remote.live(self.generation)?;
        Ok(self.remote.nodes())
    }
}

fn require_parent_dir(nodes: &BTreeMap<String, Node>, path: &str) -> RemoteResult<()> {
    match nodes.get(parent(path)) {
        Some(n) if n.is_dir() => Ok(()),
        _ => Err(RemoteError::no_such_file("No such file")),
    }
}

impl RemoteChannel for MemoryChannel {
    fn stat(&self, path: &str) -> RemoteResult<RemoteAttrs> {
        self.nodes()?
            .get(path)
            .map(Node::attrs)
            .ok_or_else(|| RemoteError::no_such_file("No such file"))
    }

    fn setstat(&self, path: &str, attrs: RemoteAttrs) -> RemoteResult<()> {
        let mut nodes = self.nodes()?;
        let node = nodes
            .get_mut(path)
            .ok_or_else(|| RemoteError::no_such_file("No such file"))?;
        if let Some(size) = attrs.size {
            if !node.is_dir() {
                node.data.resize(size as usize, 0);
            }
        }
        if let Some(perm) = attrs.perm {
            node.perm = (node.perm & S_IFMT) | (perm & 0o7777);
        }
        if let Some(atime) = attrs.atime {
            node.atime = atime;
        }
        if let Some(mtime) = attrs.mtime {
            node.mtime = mtime;
        }
        Ok(())
    }

    fn get(
        &self,
        path: &str,
        offset: u64,
        sink: &mut dyn Write,
        monitor: &mut dyn ProgressMonitor,
    ) -> RemoteResult<u64> {
        let data = {
            let nodes = self.nodes()?;
            let node = nodes
                .get(path)
                .ok_or_else(|| RemoteError::no_such_file("No such file"))?;
            if node.is_dir() {
                return Err(RemoteError::failure("Is a directory"));
            }
            node.data.clone()
        };

        monitor.init(path, offset);
        let start = (offset as usize).min(data.len());
        let mut total = 0u64;
        for chunk in data[start..].chunks(CHUNK) {
            sink.write_all(chunk)?;
            total += chunk.len() as u64;
            if !monitor.count(chunk.len() as u64) {
                break;
            }
        }
        monitor.end();
        Ok(total)
    }

    fn put(
        &self,
        path: &str,
        offset: u64,
        data: &[u8],
        monitor: &mut dyn ProgressMonitor,
    ) -> RemoteResult<()> {
        let mut nodes = self.nodes()?;
        require_parent_dir(&nodes, path)?;
        let node = nodes
            .entry(path.to_string())
            .or_insert_with(|| Node::file(b""));
        if node.is_dir() {
            return Err(RemoteError::failure("Is a directory"));
        }
        let start = offset as usize;
        if node.data.len() < start + data.len() {
            node.data.resize(start + data.len(), 0);
        }
        node.data[start..start + data.len()].copy_from_slice(data);
        monitor.count(data.len() as u64);
        Ok(())
    }

    fn create_empty(&self, path: &str) -> RemoteResult<()> {
        let mut nodes = self.nodes()?;
        require_parent_dir(&nodes, path)?;
        match nodes.get_mut(path) {
            Some(node) if node.is_dir() => Err(RemoteError::failure("Is a directory")),
            Some(node) => {
                node.data.clear();
                Ok(())
            }
            None => {
                nodes.insert(path.to_string(), Node::file(b""));
                Ok(())
            }
        }
    }

    fn mkdir(&self, path: &str, mode: u32) -> RemoteResult<()> {
        let mut nodes = self.nodes()?;
        require_parent_dir(&nodes, path)?;
        if nodes.contains_key(path) {
            return Err(RemoteError::already_exists("File already exists"));
        }
        let mut dir = Node::dir();
        dir.perm = S_IFDIR | (mode & 0o7777);
        nodes.insert(path.to_string(), dir);
        Ok(())
    }

    fn rmdir(&self, path: &str) -> RemoteResult<()> {
        let mut nodes = self.nodes()?;
        match nodes.get(path) {
            Some(n) if n.is_dir() => {}
            Some(_) => return Err(RemoteError::failure("Not a directory")),
            None => return Err(RemoteError::no_such_file("No such file")),
        }
        let prefix = format!("{}/", path);
        if nodes.keys().any(|k| k.starts_with(&prefix)) {
            return Err(RemoteError::failure("Directory not empty"));
        }
        nodes.remove(path);
        Ok(())
    }

    fn remove(&self, path: &str) -> RemoteResult<()> {
        let mut nodes = self.nodes()?;
        match nodes.get(path) {
            Some(n) if n.is_dir() => Err(RemoteError::failure("Is a directory")),
            Some(_) => {
                nodes.remove(path);
                Ok(())
            }
            None => Err(RemoteError::no_such_file("No such file")),
        }
    }

    fn rename(&self, from: &str, to: &str, overwrite: bool) -> RemoteResult<()> {
        let mut nodes = self.nodes()?;
        if !nodes.contains_key(from) {
            return Err(RemoteError::no_such_file("No such file"));
        }
        require_parent_dir(&nodes, to)?;
        if nodes.contains_key(to) {
            if self.remote.ignore_rename_overwrite.load(Ordering::SeqCst) {
                return Err(RemoteError::failure("Failure"));
            }
            if !overwrite {
                return Err(RemoteError::already_exists("File already exists"));
            }
        }

        let prefix = format!("{}/", from);
        let moved: Vec<String> = nodes
            .keys()
            .filter(|k| k.as_str() == from || k.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let new = format!("{}{}", to, &old[from.len()..]);
                nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn readdir(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let nodes = self.nodes()?;
        let dir = nodes
            .get(path)
            .ok_or_else(|| RemoteError::no_such_file("No such file"))?;
        if !dir.is_dir() {
            return Err(RemoteError::failure("Not a directory"));
        }

        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        let mut entries = vec![
            RemoteEntry {
                name: ".".into(),
                attrs: dir.attrs(),
            },
            RemoteEntry {
                name: "..".into(),
                attrs: Node::dir().attrs(),
            },
        ];
        for (key, node) in nodes.iter() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') {
                    entries.push(RemoteEntry {
                        name: rest.to_string(),
                        attrs: node.attrs(),
                    });
                }
            }
        }
        Ok(entries)
    }

    fn exit(&self) {}

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
