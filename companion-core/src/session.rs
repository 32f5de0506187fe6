//! Session controller: connect, dispatch, reconnection, and the
//! authentication/heartbeat state machine.
//!
//! The TCP stream is split through the codec into two halves, exactly
//! one task owning each concern:
//! - **Reader**: parses frames and resolves pending completions by
//!   serial; on clean EOF it drives reconnection.
//! - **Keepalive**: sleeps on the idle deadline and emits heartbeats,
//!   escalating a failed heartbeat to a re-authenticate.
//!
//! Callers send from arbitrary tasks; a mutex around the write half
//! keeps concurrent frames from interleaving on the wire.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{self, Instant};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::CompanionCodec;
use crate::commands::{Command, HeartbeatDetail};
use crate::error::{CompanionError, ResetSide};
use crate::obfuscate;
use crate::packet::{ClientCommand, PacketKind, ServerPacket};
use crate::protocol::{CONNECT_TIMEOUT, HEARTBEAT_TIMEOUT, RECONNECTION_REQUEST_MARKER};
use crate::registry::{PendingReply, Serial, SerialRegistry};

type SessionFramed = Framed<TcpStream, CompanionCodec>;
type WriteHalf = SplitSink<SessionFramed, ClientCommand>;
type ReadHalf = SplitStream<SessionFramed>;

// ── IdleTimer ────────────────────────────────────────────────────

/// Deadline the keepalive task re-reads after every wake-up. Touching
/// the timer pushes the deadline out; the task only fires a heartbeat
/// when the deadline it slept on is still current.
#[derive(Debug)]
struct IdleTimer {
    deadline: StdMutex<Instant>,
}

impl IdleTimer {
    fn new() -> Self {
        Self {
            deadline: StdMutex::new(Instant::now() + HEARTBEAT_TIMEOUT),
        }
    }

    fn touch(&self) {
        let mut deadline = self
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *deadline = Instant::now() + HEARTBEAT_TIMEOUT;
    }

    fn deadline(&self) -> Instant {
        *self
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Session ──────────────────────────────────────────────────────

/// A live command session with a paired canvas application.
///
/// Dropping the session closes it.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish()
    }
}

struct SessionInner {
    remote_addr: SocketAddr,
    generation: String,
    /// Password in effect; replaced by the proposed next password on a
    /// successful initial Authenticate.
    password: StdMutex<String>,
    /// True only between an Authenticate success and the next failure
    /// or teardown.
    alive: AtomicBool,
    writer: Mutex<WriteHalf>,
    registry: SerialRegistry,
    idle: IdleTimer,
    /// At most one authentication exchange is in flight per session.
    auth_gate: Mutex<()>,
    /// Bumped whenever a fresh keepalive task takes timer ownership;
    /// stale tasks notice and exit.
    keepalive_epoch: AtomicU64,
    shutdown: CancellationToken,
}

impl Session {
    /// Dial each endpoint in order with a bounded connect timeout and
    /// build a session on the first stream that answers. If every
    /// endpoint fails, the last error is reported.
    pub async fn connect(
        endpoints: &[String],
        port: u16,
        generation: impl Into<String>,
    ) -> Result<Self, CompanionError> {
        let generation = generation.into();
        let mut last_err = None;
        for host in endpoints {
            let addr = format!("{host}:{port}");
            debug!(%addr, "dialing");
            match time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
                Ok(Ok(stream)) => return Self::start(stream, generation),
                Ok(Err(e)) => {
                    debug!(%addr, error = %e, "dial failed");
                    last_err = Some(CompanionError::Transport(e));
                }
                Err(_) => {
                    last_err = Some(CompanionError::Transport(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("dial {addr} timed out"),
                    )));
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| CompanionError::Pairing("endpoint list is empty".into())))
    }

    fn start(stream: TcpStream, generation: String) -> Result<Self, CompanionError> {
        let _ = stream.set_nodelay(true);
        let remote_addr = stream.peer_addr()?;
        let (writer, reader) = Framed::new(stream, CompanionCodec).split();

        let inner = Arc::new(SessionInner {
            remote_addr,
            generation,
            password: StdMutex::new(String::new()),
            alive: AtomicBool::new(false),
            writer: Mutex::new(writer),
            registry: SerialRegistry::new(),
            idle: IdleTimer::new(),
            auth_gate: Mutex::new(()),
            keepalive_epoch: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(read_loop(Arc::clone(&inner), reader));
        info!(%remote_addr, "connected");
        Ok(Self { inner })
    }

    /// Perform the initial credential handshake. On success the session
    /// is alive, a fresh password has been adopted, and the keepalive
    /// task owns the idle timer.
    pub async fn authenticate(&self, password: &str) -> Result<(), CompanionError> {
        self.inner.authenticate(password).await
    }

    /// Queue a command and obtain the handle that resolves with the
    /// server's reply. Fails fast when the session is not alive, unless
    /// the command is `Authenticate`.
    pub async fn send_command(
        &self,
        command: Command,
        detail: Option<Value>,
    ) -> Result<PendingReply, CompanionError> {
        self.inner.send_command(command, detail).await
    }

    /// Send a command and wait for the reply.
    pub async fn request(
        &self,
        command: Command,
        detail: Option<Value>,
    ) -> Result<ServerPacket, CompanionError> {
        self.send_command(command, detail).await?.wait().await
    }

    /// Whether the session has authenticated and not since failed.
    pub fn alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Address of the peer this session is bound to.
    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    /// Number of commands still awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.inner.registry.pending_count()
    }

    /// Tear the session down: every pending completion resolves with a
    /// reset error, the socket is shut, and both background tasks stop.
    /// Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.close();
    }
}

// ── SessionInner ─────────────────────────────────────────────────

impl SessionInner {
    async fn send_command(
        &self,
        command: Command,
        detail: Option<Value>,
    ) -> Result<PendingReply, CompanionError> {
        if self.shutdown.is_cancelled() {
            return Err(CompanionError::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "session is closed",
            )));
        }
        if !self.alive.load(Ordering::SeqCst) && command != Command::Authenticate {
            return Err(CompanionError::NotAlive);
        }

        let serial = self.registry.allocate();
        debug!(%serial, command = %command, "sending");
        let frame = ClientCommand {
            command,
            serial,
            detail,
        };

        // Register before writing so a fast reply cannot race the
        // bookkeeping; withdraw the entry again if the write fails.
        let (tx, rx) = oneshot::channel();
        self.registry.register(serial, tx);
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.send(frame).await {
                drop(self.registry.take(serial));
                return Err(e);
            }
        }
        self.idle.touch();
        Ok(PendingReply::new(serial, rx))
    }

    /// Route a parsed packet: resolve the matching pending completion,
    /// or handle it as a server-initiated command.
    fn dispatch(&self, packet: ServerPacket) {
        let serial = packet.serial;
        let kind = packet.kind;
        let command = packet.command.clone();
        if self.registry.complete(serial, Ok(packet)) {
            return;
        }

        if kind == PacketKind::Command {
            // Unsolicited traffic is proof of life either way; only
            // serial 0 carries the reset-and-resync meaning.
            self.idle.touch();
            if serial == Serial(0) {
                info!(%command, "server-side reset");
                self.registry.cancel_all(ResetSide::Server);
                self.registry.reset_to(serial.0 + 1);
            } else {
                warn!(%serial, %command, "dropping unsolicited server command");
            }
        } else {
            warn!(%serial, "dropping response for unknown serial");
        }
    }

    /// Client-side reset: used at every connection boundary.
    fn reset(&self) {
        self.alive.store(false, Ordering::SeqCst);
        info!("client-side reset");
        self.registry.cancel_all(ResetSide::Client);
        self.registry.reset_to(0);
    }

    /// Rebuild the transport after a clean EOF: reset, dial the same
    /// remote, swap the write half, and re-authenticate off the reader
    /// task so the exchange's own reply can flow.
    async fn reconnect(self: &Arc<Self>) -> Result<ReadHalf, CompanionError> {
        self.reset();

        let stream = time::timeout(CONNECT_TIMEOUT, TcpStream::connect(self.remote_addr))
            .await
            .map_err(|_| {
                CompanionError::Transport(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("redial {} timed out", self.remote_addr),
                ))
            })??;
        let _ = stream.set_nodelay(true);
        let (writer, reader) = Framed::new(stream, CompanionCodec).split();
        *self.writer.lock().await = writer;
        info!(remote_addr = %self.remote_addr, "reconnected");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            match inner.reauth_exchange().await {
                Ok(()) => inner.spawn_keepalive(),
                Err(e) => {
                    error!(error = %e, "re-authentication after reconnect failed");
                    inner.close();
                }
            }
        });

        Ok(reader)
    }

    async fn authenticate(self: &Arc<Self>, password: &str) -> Result<(), CompanionError> {
        let _gate = self.auth_gate.lock().await;
        let next_password = obfuscate::make_password()?;
        let detail = json!([
            self.generation,
            obfuscate::auth_field_hex(password.as_bytes()),
            obfuscate::auth_field_hex(next_password.as_bytes()),
        ]);

        let reply = self
            .send_command(Command::Authenticate, Some(detail))
            .await?
            .wait()
            .await?;
        if reply.kind.is_error() {
            self.registry.reset_to(0);
            return Err(CompanionError::Auth("authentication failed"));
        }

        {
            let mut current = self
                .password
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *current = next_password;
        }
        info!("authenticated");
        self.spawn_keepalive();
        Ok(())
    }

    /// Re-authentication exchange only; restarting keepalive is the
    /// caller's concern, because the keepalive task itself re-auths
    /// inline after a failed heartbeat.
    async fn reauth_exchange(&self) -> Result<(), CompanionError> {
        let _gate = self.auth_gate.lock().await;
        let current = self
            .password
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let detail = json!([
            self.generation,
            obfuscate::auth_field_hex(RECONNECTION_REQUEST_MARKER),
            obfuscate::auth_field_hex(current.as_bytes()),
        ]);

        let reply = self
            .send_command(Command::Authenticate, Some(detail))
            .await?
            .wait()
            .await?;
        if reply.kind.is_error() {
            self.registry.reset_to(0);
            return Err(CompanionError::Auth("re-authentication failed"));
        }
        info!("re-authenticated");
        Ok(())
    }

    /// Mark the session alive and hand the idle timer to a fresh
    /// keepalive task, unless one already owns it.
    fn spawn_keepalive(self: &Arc<Self>) {
        self.idle.touch();
        if self.alive.swap(true, Ordering::SeqCst) {
            return;
        }
        let epoch = self.keepalive_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(keepalive(Arc::clone(self), epoch));
    }

    async fn heartbeat(&self) -> Result<(), CompanionError> {
        let detail = serde_json::to_value(HeartbeatDetail::default())?;
        let reply = self
            .send_command(Command::TellHeartbeat, Some(detail))
            .await?
            .wait()
            .await?;
        if reply.kind.is_error() {
            return Err(CompanionError::Heartbeat);
        }
        Ok(())
    }

    fn close(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.alive.store(false, Ordering::SeqCst);
        self.registry.cancel_all(ResetSide::Client);

        // Shut the socket from a task; close() stays callable from
        // sync contexts, including Drop outside a runtime.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let inner = Arc::clone(self);
            handle.spawn(async move {
                let mut writer = inner.writer.lock().await;
                let _ = writer.close().await;
            });
        }
        info!("session closed");
    }
}

// ── Background tasks ─────────────────────────────────────────────

async fn read_loop(inner: Arc<SessionInner>, mut reader: ReadHalf) {
    loop {
        let next = tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => return,
            next = reader.next() => next,
        };

        match next {
            Some(Ok(packet)) => inner.dispatch(packet),
            Some(Err(e)) => {
                error!(error = %e, "read loop failed");
                inner.close();
                return;
            }
            None => {
                info!("connection closed by peer, reconnecting");
                match inner.reconnect().await {
                    Ok(new_reader) => reader = new_reader,
                    Err(e) => {
                        error!(error = %e, "reconnection failed");
                        inner.close();
                        return;
                    }
                }
            }
        }
    }
}

async fn keepalive(inner: Arc<SessionInner>, epoch: u64) {
    loop {
        let deadline = inner.idle.deadline();
        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => return,
            _ = time::sleep_until(deadline) => {}
        }

        if inner.keepalive_epoch.load(Ordering::SeqCst) != epoch {
            return; // a newer task owns the timer
        }
        if !inner.alive.load(Ordering::SeqCst) {
            return;
        }
        if inner.idle.deadline() > Instant::now() {
            continue; // traffic moved the deadline while we slept
        }

        match inner.heartbeat().await {
            Ok(()) => inner.idle.touch(),
            Err(e) => {
                debug!(error = %e, "heartbeat failed");
                inner.alive.store(false, Ordering::SeqCst);
                match inner.reauth_exchange().await {
                    Ok(()) => {
                        inner.alive.store(true, Ordering::SeqCst);
                        inner.idle.touch();
                    }
                    Err(e) => {
                        error!(error = %e, "re-authentication after failed heartbeat");
                        inner.close();
                        return;
                    }
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
