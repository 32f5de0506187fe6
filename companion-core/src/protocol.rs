//! Wire-level constants for the companion TCP command protocol.

use std::time::Duration;

/// Literal first fragment of every packet body.
pub const PROTOCOL_VERSION_LINE: &[u8] = b"tcp_remote_command_protocol_version=1.0";

/// Two-byte separator between body fragments: RS (`0x1E`) followed by `$`.
pub const PARAM_SEPARATOR: [u8; 2] = [0x1e, b'$'];

/// Every packet ends with a single NUL byte.
pub const TERMINATOR: u8 = 0x00;

/// Separates the JSON head of a `detail` fragment from an optional
/// raw-byte tail.
pub const DETAIL_SEPARATOR: u8 = 0x0b;

/// Fixed credential stand-in sent in place of a password when
/// re-authenticating an existing pairing after a reconnect.
pub const RECONNECTION_REQUEST_MARKER: &[u8] = b"{{(([[reconnection request marker]]))}}\r\n";

/// Idle time before the keepalive task emits a heartbeat.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on a single TCP dial attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames larger than this are rejected by the codec. Preview block
/// payloads run to a few megabytes of raw RGB; anything beyond this is
/// a peer that stopped terminating its packets.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
