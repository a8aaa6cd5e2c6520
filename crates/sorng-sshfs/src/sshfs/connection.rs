// ── Connection management ────────────────────────────────────────────────────
//
// One SSH session shared by every worker thread, plus one SFTP channel per
// caller. Two locks are involved:
//
//   * `state` guards the session and the channel cache. Channel acquisition
//     holds it, and so does the whole reconnect sequence, so nobody can pick
//     up a channel from a session that is being torn down.
//   * `reconnect_lock` serialises reconnect attempts. It is always taken
//     before `state`, never the other way around.
//
// The connection-error flag is read outside both locks as a fast path.
// Once `shutdown` runs, no channel is handed out and no reconnect happens
// until `connect` is called again.

use crate::sshfs::error::{RemoteError, RemoteResult};
use crate::sshfs::transport::{Connector, RemoteChannel, RemoteSession};
use crate::sshfs::types::{CallerId, MountConfig};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A channel handed out to a caller, tagged with the session generation it
/// was opened under.
#[derive(Clone)]
pub struct ChannelLease {
    pub channel: Arc<dyn RemoteChannel>,
    pub generation: u64,
}

#[derive(Default)]
struct SessionState {
    session: Option<Box<dyn RemoteSession>>,
    channels: HashMap<CallerId, Arc<dyn RemoteChannel>>,
}

impl SessionState {
    /// Close every cached channel and the session. Failures are logged only.
    fn teardown(&mut self) {
        for (caller, channel) in self.channels.drain() {
            debug!("Closing channel for caller {:?}", caller);
            channel.disconnect();
        }
        if let Some(session) = self.session.take() {
            if let Err(e) = session.disconnect() {
                debug!("Session disconnect failed: {}", e);
            }
        }
    }
}

pub struct ConnectionManager {
    config: MountConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<SessionState>,
    reconnect_lock: Mutex<()>,
    connection_error: AtomicBool,
    retry_count: AtomicU64,
    generation: AtomicU64,
    shut_down: AtomicBool,
}

impl ConnectionManager {
    pub fn new(config: MountConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            state: Mutex::new(SessionState::default()),
            reconnect_lock: Mutex::new(()),
            connection_error: AtomicBool::new(false),
            retry_count: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Connect ──────────────────────────────────────────────────────────

    /// Establish the shared session, discarding any cached channels.
    pub fn connect(&self) -> RemoteResult<()> {
        let mut state = self.lock_state();
        self.shut_down.store(false, Ordering::SeqCst);
        self.connect_locked(&mut state)
    }

    fn connect_locked(&self, state: &mut SessionState) -> RemoteResult<()> {
        state.channels.clear();
        state.session = None;

        info!(
            "Connecting to {}@{}",
            self.config.username,
            self.config.address()
        );
        match self.connector.connect(&self.config) {
            Ok(session) => {
                state.session = Some(session);
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                info!("Connected (session generation {})", generation);
                Ok(())
            }
            Err(e) => {
                warn!("Connect to {} failed: {}", self.config.address(), e);
                Err(e)
            }
        }
    }

    /// True while a session is established.
    pub fn is_connected(&self) -> bool {
        self.lock_state().session.is_some()
    }

    // ── Channel cache ────────────────────────────────────────────────────

    /// The caller's cached channel, or a fresh one opened on the shared
    /// session. A cached channel that reports itself disconnected is
    /// replaced.
    pub fn acquire_channel(&self, caller: CallerId) -> RemoteResult<ChannelLease> {
        let mut state = self.lock_state();
        if self.is_shut_down() {
            return Err(unmounted());
        }
        let generation = self.generation.load(Ordering::SeqCst);

        if let Some(channel) = state.channels.get(&caller) {
            if channel.is_connected() {
                return Ok(ChannelLease {
                    channel: channel.clone(),
                    generation,
                });
            }
            debug!("Cached channel for caller {:?} is stale", caller);
            state.channels.remove(&caller);
        }

        let session = state
            .session
            .as_ref()
            .ok_or_else(|| RemoteError::transport("SSH session is not connected"))?;
        let channel = session.open_channel()?;
        debug!("Opened channel for caller {:?}", caller);
        state.channels.insert(caller, channel.clone());
        Ok(ChannelLease {
            channel,
            generation,
        })
    }

    /// Number of cached channels.
    pub fn channel_count(&self) -> usize {
        self.lock_state().channels.len()
    }

    // ── Failure tracking ─────────────────────────────────────────────────

    pub fn mark_connection_error(&self) {
        self.connection_error.store(true, Ordering::SeqCst);
    }

    /// Record a transport failure seen on a channel from `generation`.
    /// A failure from a session that has already been replaced is ignored,
    /// so callers that fail together trigger a single reconnect.
    pub fn report_transport_failure(&self, generation: Option<u64>) {
        match generation {
            Some(g) if g != self.generation.load(Ordering::SeqCst) => {
                debug!("Ignoring failure from superseded session generation {}", g);
            }
            _ => self.mark_connection_error(),
        }
    }

    pub fn connection_error(&self) -> bool {
        self.connection_error.load(Ordering::SeqCst)
    }

    /// Number of reconnect attempts made so far.
    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::SeqCst)
    }

    /// True after `shutdown` until the next `connect`.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Current session generation. Bumped on every successful connect.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    // ── Reconnect ────────────────────────────────────────────────────────

    /// Tear down and re-establish the session if the error flag is set.
    ///
    /// Concurrent callers serialise on the reconnect lock; whoever gets it
    /// after a successful reconnect sees the flag cleared and returns
    /// without touching the connection.
    pub fn reconnect(&self) -> RemoteResult<()> {
        if !self.connection_error() {
            return Ok(());
        }

        let _guard = self
            .reconnect_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if !self.connection_error() {
            return Ok(());
        }

        let mut state = self.lock_state();
        if self.is_shut_down() {
            debug!("Skipping reconnect, connection is shut down");
            return Err(unmounted());
        }
        info!("Disconnecting current session");
        state.teardown();

        let attempt = self.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Reconnect attempt {}", attempt);
        self.connect_locked(&mut state)?;

        self.connection_error.store(false, Ordering::SeqCst);
        info!("Reconnect succeeded");
        Ok(())
    }

    // ── Shutdown ─────────────────────────────────────────────────────────

    /// Ask one channel to exit, wait `drain` for the server to wind down,
    /// then close every channel and the session.
    pub fn shutdown(&self, drain: Duration) {
        self.shut_down.store(true, Ordering::SeqCst);
        let exiting = self.lock_state().channels.values().next().cloned();
        if let Some(channel) = exiting {
            channel.exit();
        }
        if !drain.is_zero() {
            std::thread::sleep(drain);
        }

        let mut state = self.lock_state();
        state.teardown();
        info!("Disconnected from {}", self.config.address());
    }
}

fn unmounted() -> RemoteError {
    RemoteError::failure("volume is unmounted")
}
