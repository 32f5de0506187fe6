//! Serial allocation and the pending-completion map.
//!
//! Every outbound command takes the next serial from an atomic counter
//! and parks a one-shot completion sender in the map. The read loop
//! resolves completions by serial; resets drain the whole map so no
//! caller is left hanging.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::{CompanionError, ResetSide};
use crate::packet::ServerPacket;

// ── Serial ───────────────────────────────────────────────────────

/// Monotonic per-session identifier correlating a command with its
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Serial(pub u32);

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Completions ──────────────────────────────────────────────────

/// One-shot sender resolving a pending command.
pub type Completion = oneshot::Sender<Result<ServerPacket, CompanionError>>;

/// Receiving half handed back by `Session::send_command`.
///
/// Resolves exactly once: with the correlated server packet, a
/// transport error, or a synthetic reset error at a session boundary.
#[derive(Debug)]
pub struct PendingReply {
    serial: Serial,
    rx: oneshot::Receiver<Result<ServerPacket, CompanionError>>,
}

impl PendingReply {
    pub(crate) fn new(
        serial: Serial,
        rx: oneshot::Receiver<Result<ServerPacket, CompanionError>>,
    ) -> Self {
        Self { serial, rx }
    }

    /// The serial the command was sent under.
    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// Wait for the reply.
    pub async fn wait(self) -> Result<ServerPacket, CompanionError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(CompanionError::ChannelClosed),
        }
    }
}

// ── SerialRegistry ───────────────────────────────────────────────

/// Atomic serial counter plus the concurrent pending map.
#[derive(Debug, Default)]
pub struct SerialRegistry {
    counter: AtomicU32,
    pending: Mutex<HashMap<Serial, Completion>>,
}

impl SerialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, HashMap<Serial, Completion>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the current counter value and advance it.
    pub fn allocate(&self) -> Serial {
        Serial(self.counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Park a completion for `serial`. Registering the same serial
    /// twice is a programming error.
    pub fn register(&self, serial: Serial, completion: Completion) {
        let prev = self.locked().insert(serial, completion);
        debug_assert!(prev.is_none(), "serial {serial} registered twice");
    }

    /// Remove and return the completion for `serial`, if any.
    pub fn take(&self, serial: Serial) -> Option<Completion> {
        self.locked().remove(&serial)
    }

    /// Resolve the completion for `serial`. The entry is removed before
    /// the sender fires, so the resolution cannot deadlock with a
    /// concurrent send. Returns `false` if no entry existed.
    pub fn complete(&self, serial: Serial, result: Result<ServerPacket, CompanionError>) -> bool {
        match self.take(serial) {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Drain every pending entry, resolving each with a reset error.
    pub fn cancel_all(&self, side: ResetSide) {
        let drained: Vec<(Serial, Completion)> = self.locked().drain().collect();
        for (serial, tx) in drained {
            tracing::debug!(%serial, "cancelling pending command for {side} reset");
            let _ = tx.send(Err(CompanionError::SessionReset(side)));
        }
    }

    /// Rewrite the counter. Used at reset boundaries and on a
    /// server-side serial resync.
    pub fn reset_to(&self, value: u32) {
        self.counter.store(value, Ordering::SeqCst);
    }

    /// Number of commands still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.locked().len()
    }
}

// ── Tests ────────────────────────────────────────────────────────
