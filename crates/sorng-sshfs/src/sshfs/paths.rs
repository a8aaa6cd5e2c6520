// ── Path translation (driver path → remote path) ─────────────────────────────

/// Prefix marking the adapter's own pseudo-streams.
pub const PROPERTY_STREAM_PREFIX: &str = "SSHFSProperty.";

/// Pseudo-stream exposing a file's permission bits as octal text.
pub const PERMISSION_STREAM: &str = "SSHFSProperty.Permission";

/// What a driver path addresses once translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPath {
    /// A regular remote file or directory.
    File(String),
    /// `<file>:SSHFSProperty.Permission`.
    PermissionStream { file: String },
    /// Any other `<file>:<stream>` path.
    Stream { file: String, stream: String },
}

#[derive(Debug, Clone)]
pub struct PathTranslator {
    root: String,
}

impl PathTranslator {
    pub fn new(root: &str) -> Self {
        let root = root.replace('\\', "/");
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    /// Remote absolute path for a driver path. Stream suffixes are kept.
    pub fn resolve(&self, virtual_path: &str) -> String {
        let mut rel = virtual_path.replace('\\', "/");
        if !rel.starts_with('/') {
            rel.insert(0, '/');
        }
        let mut joined = format!("{}{}", self.root, rel);
        while joined.len() > 1 && joined.ends_with('/') {
            joined.pop();
        }
        joined
    }

    /// Resolve a driver path and split off any stream suffix.
    pub fn classify(&self, virtual_path: &str) -> ResolvedPath {
        let remote = self.resolve(virtual_path);
        let seg_start = remote.rfind('/').map(|i| i + 1).unwrap_or(0);
        let Some(colon) = remote[seg_start..].find(':').map(|i| seg_start + i) else {
            return ResolvedPath::File(remote);
        };

        let file = remote[..colon].to_string();
        let stream = &remote[colon + 1..];
        let stream = stream.strip_suffix(":$DATA").unwrap_or(stream);

        if stream == PERMISSION_STREAM {
            ResolvedPath::PermissionStream { file }
        } else {
            ResolvedPath::Stream {
                file,
                stream: stream.to_string(),
            }
        }
    }
}

/// True when the last segment of `path` names one of the adapter's
/// pseudo-streams (`<name>:SSHFSProperty.*`).
pub fn is_virtual_permission_stream(path: &str) -> bool {
    let last = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match last.split_once(':') {
        Some((_, stream)) => stream.starts_with(PROPERTY_STREAM_PREFIX),
        None => false,
    }
}

/// Final component of a driver path, used as the reported file name.
pub fn file_name(virtual_path: &str) -> &str {
    virtual_path
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
}
