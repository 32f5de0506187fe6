//! Command catalog and typed detail payloads.
//!
//! Commands travel as plain strings on the wire; the catalog covers the
//! ones the canvas application is known to understand, with
//! [`Command::Other`] as the escape hatch for anything it sends that we
//! have not cataloged.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Command ──────────────────────────────────────────────────────

/// All known protocol commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Keepalive; resets the peer's idle timer.
    TellHeartbeat,
    /// Credential handshake; the only command allowed pre-auth.
    Authenticate,
    /// Query or set pressed modifier keys (Ctrl, Alt, Shift).
    GetModifyKeyString,
    /// Which tab the canvas application has selected.
    GetServerSelectedTabKind,
    /// Select a tab in the canvas application.
    SetServerSelectedTabKind,
    /// Webtoon preview operations (gallery update, block reads).
    PreviewWebtoonFromClient,
    /// A command outside the catalog.
    Other(String),
}

impl Command {
    pub fn as_str(&self) -> &str {
        match self {
            Self::TellHeartbeat => "TellHeartbeat",
            Self::Authenticate => "Authenticate",
            Self::GetModifyKeyString => "GetModifyKeyString",
            Self::GetServerSelectedTabKind => "GetServerSelectedTabKind",
            Self::SetServerSelectedTabKind => "SetServerSelectedTabKind",
            Self::PreviewWebtoonFromClient => "PreviewWebtoonFromClient",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for Command {
    fn from(name: &str) -> Self {
        match name {
            "TellHeartbeat" => Self::TellHeartbeat,
            "Authenticate" => Self::Authenticate,
            "GetModifyKeyString" => Self::GetModifyKeyString,
            "GetServerSelectedTabKind" => Self::GetServerSelectedTabKind,
            "SetServerSelectedTabKind" => Self::SetServerSelectedTabKind,
            "PreviewWebtoonFromClient" => Self::PreviewWebtoonFromClient,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Detail payloads ──────────────────────────────────────────────

/// `TellHeartbeat` detail. The flag is always `true` on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeartbeatDetail {
    pub idle_timer_reset_requested: bool,
}

impl Default for HeartbeatDetail {
    fn default() -> Self {
        Self {
            idle_timer_reset_requested: true,
        }
    }
}

/// `GetModifyKeyString` request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyKeyRequest {
    pub alt_pushed: bool,
    pub ctrl_pushed: bool,
    pub shift_pushed: bool,
}

/// `GetModifyKeyString` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyKeyResponse {
    pub alt_description: String,
    pub ctrl_description: String,
    pub shift_description: String,
    /// E.g. "Windows".
    pub system_kind: String,
}

/// `GetServerSelectedTabKind` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SelectedTabResponse {
    /// Typically "Invalid".
    pub server_selected_tab_kind: String,
}

/// One canvas dimension entry in a gallery update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CanvasSize {
    pub canvas_height: u64,
    pub canvas_width: u64,
}

/// `PreviewWebtoonFromClient` gallery-update request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateGalleryRequest {
    pub max_length: u64,
    /// "UpdateGallery".
    pub operation: String,
}

/// `PreviewWebtoonFromClient` gallery-update response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateGalleryResponse {
    pub operation: String,
    pub gallery_identification_number: u64,
    pub canvas_size_array: Vec<CanvasSize>,
    pub canvas_count: u64,
}

/// Server-initiated canvas reset notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResetCanvasNotice {
    /// "ResetCanvas".
    pub operation: String,
    pub canvas_index: u64,
}

/// `PreviewWebtoonFromClient` block-read request. The response carries
/// the raw RGB bytes after the detail separator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReadPreviewBlockRequest {
    /// "ReadPreviewBlock".
    pub operation: String,
    pub block_index: u64,
    pub block_top: u64,
    pub block_left: u64,
    pub block_bottom: u64,
    pub block_right: u64,
    pub canvas_index: u64,
    pub gallery_identification_number: u64,
}

// ── Tests ────────────────────────────────────────────────────────
