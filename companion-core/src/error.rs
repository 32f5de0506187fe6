//! Domain-specific error types for the companion protocol.
//!
//! All fallible operations return `Result<T, CompanionError>`.
//! No panics on invalid input — every error is typed and recoverable.

use thiserror::Error;

// ── ResetSide ────────────────────────────────────────────────────

/// Which end tore the session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetSide {
    /// Internal teardown (reconnect boundary or explicit close).
    Client,
    /// Signaled by a server-initiated packet with serial 0.
    Server,
}

impl std::fmt::Display for ResetSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client-side"),
            Self::Server => write!(f, "server-side"),
        }
    }
}

// ── CompanionError ───────────────────────────────────────────────

/// The canonical error type for the companion session core.
#[derive(Debug, Error)]
pub enum CompanionError {
    // ── Pairing ──────────────────────────────────────────────────
    /// The share URL or its embedded parameters are malformed.
    #[error("pairing error: {0}")]
    Pairing(String),

    /// The OS random number generator failed while deriving a new
    /// session password.
    #[error("password generation failed: {0}")]
    PasswordGeneration(String),

    // ── Wire ─────────────────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A received packet violated the framing rules.
    #[error("framing error: {0}")]
    Framing(String),

    /// A byte did not map to any known packet kind.
    #[error("unknown packet kind: {0:#04x}")]
    UnknownPacketKind(u8),

    /// A `detail` payload could not be serialized.
    #[error("detail encoding error: {0}")]
    Detail(#[from] serde_json::Error),

    // ── Session ──────────────────────────────────────────────────
    /// The server answered an Authenticate command with an error packet.
    #[error("{0}")]
    Auth(&'static str),

    /// A heartbeat was answered with an error packet.
    #[error("heartbeat failed")]
    Heartbeat,

    /// A command other than Authenticate was sent before the session
    /// was authenticated.
    #[error("session is not alive")]
    NotAlive,

    /// Synthetic error delivered to every pending command at a reset
    /// boundary.
    #[error("{0} reset")]
    SessionReset(ResetSide),

    /// A completion channel was dropped without being resolved.
    #[error("completion channel closed")]
    ChannelClosed,
}

impl CompanionError {
    /// Returns `true` for the synthetic reset error delivered at
    /// session boundaries.
    pub fn is_reset(&self) -> bool {
        matches!(self, Self::SessionReset(_))
    }
}
