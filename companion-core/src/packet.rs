//! Packet framing: outbound client commands and inbound server packets.
//!
//! ## Wire format
//!
//! Frames are ASCII text with binary delimiters:
//!
//! ```text
//! <kind:1> '$' <fragment>(<0x1E '$'><fragment>)* <0x1E> <0x00>
//! ```
//!
//! Body fragments, in order:
//!
//! ```text
//! tcp_remote_command_protocol_version=1.0
//! command=<Command>
//! serial=<u32 decimal>
//! detail=<JSON>[<0x0B><raw bytes>]
//! ```
//!
//! `detail=` is emitted even when there is no payload. A server packet
//! may append raw bytes (preview pixel data) after the JSON head,
//! introduced by the detail separator `0x0B`.

use serde_json::Value;

use crate::commands::Command;
use crate::error::CompanionError;
use crate::protocol::{DETAIL_SEPARATOR, PARAM_SEPARATOR, PROTOCOL_VERSION_LINE, TERMINATOR};
use crate::registry::Serial;

/// No well-formed packet is shorter than this.
pub const MIN_PACKET_LEN: usize = 72;

// ── PacketKind ───────────────────────────────────────────────────

/// First byte of every frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// A command. Sent by the client; also used by the server for
    /// unsolicited (server-initiated) commands.
    Command = 0x01,
    /// Server acknowledged the correlated command.
    Success = 0x06,
    /// Server rejected the correlated command.
    Error = 0x15,
}

impl TryFrom<u8> for PacketKind {
    type Error = CompanionError;

    fn try_from(value: u8) -> Result<Self, CompanionError> {
        match value {
            0x01 => Ok(PacketKind::Command),
            0x06 => Ok(PacketKind::Success),
            0x15 => Ok(PacketKind::Error),
            other => Err(CompanionError::UnknownPacketKind(other)),
        }
    }
}

impl PacketKind {
    /// Returns `true` for the server's error-response kind.
    pub fn is_error(&self) -> bool {
        matches!(self, PacketKind::Error)
    }
}

// ── ClientCommand ────────────────────────────────────────────────

/// An outbound command awaiting its serial-correlated response.
#[derive(Debug, Clone)]
pub struct ClientCommand {
    pub command: Command,
    pub serial: Serial,
    /// JSON payload, or `None` for an empty `detail=` field.
    pub detail: Option<Value>,
}

impl ClientCommand {
    /// Serialize to a complete frame, terminator included.
    pub fn encode(&self) -> Result<Vec<u8>, CompanionError> {
        let mut buf = Vec::with_capacity(128);
        buf.push(PacketKind::Command as u8);
        buf.push(b'$');
        buf.extend_from_slice(PROTOCOL_VERSION_LINE);
        buf.extend_from_slice(&PARAM_SEPARATOR);
        buf.extend_from_slice(b"command=");
        buf.extend_from_slice(self.command.as_str().as_bytes());
        buf.extend_from_slice(&PARAM_SEPARATOR);
        buf.extend_from_slice(b"serial=");
        buf.extend_from_slice(self.serial.to_string().as_bytes());
        buf.extend_from_slice(&PARAM_SEPARATOR);
        buf.extend_from_slice(b"detail=");
        if let Some(detail) = &self.detail {
            serde_json::to_writer(&mut buf, detail)?;
        }
        buf.push(PARAM_SEPARATOR[0]);
        buf.push(TERMINATOR);
        Ok(buf)
    }
}

// ── ServerPacket ─────────────────────────────────────────────────

/// A parsed inbound frame.
#[derive(Debug, Clone)]
pub struct ServerPacket {
    pub kind: PacketKind,
    pub command: Command,
    pub serial: Serial,
    /// JSON head of the detail fragment, if longer than two bytes.
    pub detail: Option<Value>,
    /// Raw bytes following the detail separator, if any.
    pub data: Option<Vec<u8>>,
}

impl ServerPacket {
    /// Parse a complete frame (terminator included), enforcing every
    /// framing rule. Any violation is fatal to the packet.
    pub fn parse(data: &[u8]) -> Result<Self, CompanionError> {
        if data.len() < MIN_PACKET_LEN {
            return Err(CompanionError::Framing(format!(
                "packet too short: {} bytes",
                data.len()
            )));
        }
        let kind = PacketKind::try_from(data[0])?;
        if data[1] != b'$' {
            return Err(CompanionError::Framing("missing '$' after kind byte".into()));
        }
        if data[data.len() - 1] != TERMINATOR {
            return Err(CompanionError::Framing("missing terminator".into()));
        }

        // Body excludes the kind byte, the '$', the trailing 0x1E, and
        // the NUL. The fourth fragment keeps any further separators; the
        // raw data tail may contain them.
        let body = &data[2..data.len() - 2];
        let frags = splitn_separator(body, 4);
        if frags.len() != 4 {
            return Err(CompanionError::Framing(format!(
                "expected 4 body fragments, got {}",
                frags.len()
            )));
        }

        if frags[0] != PROTOCOL_VERSION_LINE {
            return Err(CompanionError::Framing(format!(
                "unsupported protocol version '{}'",
                String::from_utf8_lossy(frags[0])
            )));
        }

        let command_raw = strip_field(frags[1], b"command=")?;
        let command_text = std::str::from_utf8(command_raw)
            .map_err(|_| CompanionError::Framing("command is not UTF-8".into()))?;
        let command = Command::from(command_text);

        let serial_raw = strip_field(frags[2], b"serial=")?;
        let serial = std::str::from_utf8(serial_raw)
            .ok()
            .and_then(|text| text.parse::<u32>().ok())
            .map(Serial)
            .ok_or_else(|| {
                CompanionError::Framing(format!(
                    "invalid serial '{}'",
                    String::from_utf8_lossy(serial_raw)
                ))
            })?;

        let detail_raw = strip_field(frags[3], b"detail=")?;
        let mut detail = None;
        let mut raw_data = None;
        let (head, tail) = match detail_raw
            .iter()
            .position(|&b| b == DETAIL_SEPARATOR)
        {
            Some(pos) => (&detail_raw[..pos], Some(&detail_raw[pos + 1..])),
            None => (detail_raw, None),
        };
        if head.len() > 2 {
            let value: Value = serde_json::from_slice(head).map_err(|e| {
                CompanionError::Framing(format!(
                    "invalid detail JSON '{}': {e}",
                    String::from_utf8_lossy(head)
                ))
            })?;
            detail = Some(value);
            raw_data = tail.map(<[u8]>::to_vec);
        }

        Ok(Self {
            kind,
            command,
            serial,
            detail,
            data: raw_data,
        })
    }

    /// JSON object view of this packet, for embedders and CLI output.
    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("command".into(), Value::from(self.command.as_str()));
        obj.insert("serial".into(), Value::from(self.serial.0));
        let kind = match self.kind {
            PacketKind::Success => "success",
            PacketKind::Error => "error",
            PacketKind::Command => "command",
        };
        obj.insert("type".into(), Value::from(kind));
        if let Some(detail) = &self.detail {
            obj.insert("detail".into(), detail.clone());
        }
        if let Some(data) = &self.data {
            obj.insert(
                "data".into(),
                Value::from(String::from_utf8_lossy(data).into_owned()),
            );
        }
        Value::Object(obj)
    }
}

/// Split `body` on the two-byte param separator into at most `limit`
/// fragments; the final fragment keeps any remaining separators.
fn splitn_separator(body: &[u8], limit: usize) -> Vec<&[u8]> {
    let mut frags = Vec::with_capacity(limit);
    let mut rest = body;
    while frags.len() + 1 < limit {
        match rest.windows(2).position(|w| w == PARAM_SEPARATOR) {
            Some(pos) => {
                frags.push(&rest[..pos]);
                rest = &rest[pos + 2..];
            }
            None => break,
        }
    }
    frags.push(rest);
    frags
}

fn strip_field<'a>(frag: &'a [u8], prefix: &[u8]) -> Result<&'a [u8], CompanionError> {
    frag.strip_prefix(prefix).ok_or_else(|| {
        CompanionError::Framing(format!(
            "malformed fragment '{}'",
            String::from_utf8_lossy(frag)
        ))
    })
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Synthesize a server frame the way the canvas application would.
    fn server_frame(kind: u8, command: &str, serial: u32, detail: &[u8]) -> Vec<u8> {
        let mut buf = vec![kind, b'$'];
        buf.extend_from_slice(PROTOCOL_VERSION_LINE);
        buf.extend_from_slice(&PARAM_SEPARATOR);
        buf.extend_from_slice(format!("command={command}").as_bytes());
        buf.extend_from_slice(&PARAM_SEPARATOR);
        buf.extend_from_slice(format!("serial={serial}").as_bytes());
        buf.extend_from_slice(&PARAM_SEPARATOR);
        buf.extend_from_slice(b"detail=");
        buf.extend_from_slice(detail);
        buf.push(PARAM_SEPARATOR[0]);
        buf.push(TERMINATOR);
        buf
    }

    #[test]
    fn encode_layout() {
        let cmd = ClientCommand {
            command: Command::Authenticate,
            serial: Serial(0),
            detail: Some(json!(["G#1", "aa", "bb"])),
        };
        let bytes = cmd.encode().unwrap();
        assert_eq!(bytes[0], 0x01);
        assert_eq!(bytes[1], b'$');
        assert_eq!(*bytes.last().unwrap(), 0x00);
        assert_eq!(bytes[bytes.len() - 2], 0x1e);

        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("tcp_remote_command_protocol_version=1.0"));
        assert!(text.contains("command=Authenticate"));
        assert!(text.contains("serial=0"));
        assert!(text.contains("detail=[\"G#1\",\"aa\",\"bb\"]"));
    }

    #[test]
    fn encode_empty_detail_still_emits_field() {
        let cmd = ClientCommand {
            command: Command::TellHeartbeat,
            serial: Serial(3),
            detail: None,
        };
        let bytes = cmd.encode().unwrap();
        // detail= is immediately followed by the trailing 0x1E.
        let pos = bytes
            .windows(7)
            .position(|w| w == b"detail=")
            .unwrap();
        assert_eq!(bytes[pos + 7], 0x1e);
    }

    #[test]
    fn outbound_frame_parses_back() {
        let cmd = ClientCommand {
            command: Command::Other("PreviewWebtoonFromClient".into()),
            serial: Serial(42),
            detail: Some(json!({"Operation": "UpdateGallery", "MaxLength": 20})),
        };
        let bytes = cmd.encode().unwrap();
        let parsed = ServerPacket::parse(&bytes).unwrap();
        assert_eq!(parsed.kind, PacketKind::Command);
        assert_eq!(parsed.command.as_str(), "PreviewWebtoonFromClient");
        assert_eq!(parsed.serial, Serial(42));
        assert_eq!(
            parsed.detail,
            Some(json!({"Operation": "UpdateGallery", "MaxLength": 20}))
        );
        assert!(parsed.data.is_none());
    }

    #[test]
    fn parse_success_packet() {
        let frame = server_frame(0x06, "Authenticate", 0, b"[]");
        let pkt = ServerPacket::parse(&frame).unwrap();
        assert_eq!(pkt.kind, PacketKind::Success);
        assert_eq!(pkt.command, Command::Authenticate);
        assert_eq!(pkt.serial, Serial(0));
        // A two-byte head is below the JSON threshold.
        assert!(pkt.detail.is_none());
    }

    #[test]
    fn parse_error_packet() {
        let frame = server_frame(0x15, "TellHeartbeat", 7, b"{\"Reason\":\"idle\"}");
        let pkt = ServerPacket::parse(&frame).unwrap();
        assert!(pkt.kind.is_error());
        assert_eq!(pkt.detail, Some(json!({"Reason": "idle"})));
    }

    #[test]
    fn parse_detail_with_raw_tail() {
        let mut detail = b"{\"BlockIndex\":0}".to_vec();
        detail.push(DETAIL_SEPARATOR);
        detail.extend_from_slice(&[0x00, 0x1e, b'$', 0xff]); // raw bytes may hold delimiters
        let frame = server_frame(0x06, "PreviewWebtoonFromClient", 9, &detail);
        let pkt = ServerPacket::parse(&frame).unwrap();
        assert_eq!(pkt.detail, Some(json!({"BlockIndex": 0})));
        assert_eq!(pkt.data.as_deref(), Some(&[0x00, 0x1e, b'$', 0xff][..]));
    }

    #[test]
    fn rejects_short_packet() {
        let err = ServerPacket::parse(&[0x06, b'$', 0x00]).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut frame = server_frame(0x06, "Authenticate", 0, b"[]");
        frame[0] = 0x2a;
        assert!(matches!(
            ServerPacket::parse(&frame),
            Err(CompanionError::UnknownPacketKind(0x2a))
        ));
    }

    #[test]
    fn rejects_missing_dollar() {
        let mut frame = server_frame(0x06, "Authenticate", 0, b"[]");
        frame[1] = b'#';
        assert!(ServerPacket::parse(&frame).is_err());
    }

    #[test]
    fn rejects_wrong_version() {
        let frame = server_frame(0x06, "Authenticate", 0, b"[]");
        let mut tampered = frame.clone();
        tampered[2..5].copy_from_slice(b"udp");
        let err = ServerPacket::parse(&tampered).unwrap_err();
        assert!(err.to_string().contains("protocol version"));
    }

    #[test]
    fn rejects_bad_serial() {
        let mut buf = vec![0x06, b'$'];
        buf.extend_from_slice(PROTOCOL_VERSION_LINE);
        buf.extend_from_slice(&PARAM_SEPARATOR);
        buf.extend_from_slice(b"command=Authenticate");
        buf.extend_from_slice(&PARAM_SEPARATOR);
        buf.extend_from_slice(b"serial=notanumber");
        buf.extend_from_slice(&PARAM_SEPARATOR);
        buf.extend_from_slice(b"detail=");
        buf.push(0x1e);
        buf.push(TERMINATOR);
        let err = ServerPacket::parse(&buf).unwrap_err();
        assert!(err.to_string().contains("serial"));
    }

    #[test]
    fn rejects_bad_detail_json() {
        let frame = server_frame(0x06, "Authenticate", 0, b"{broken");
        let err = ServerPacket::parse(&frame).unwrap_err();
        assert!(err.to_string().contains("detail JSON"));
    }

    #[test]
    fn rejects_wrong_fragment_count() {
        let mut buf = vec![0x06, b'$'];
        buf.extend_from_slice(PROTOCOL_VERSION_LINE);
        buf.extend_from_slice(&PARAM_SEPARATOR);
        buf.extend_from_slice(b"command=Authenticate-padded-out-to-length-xxxxxxxxxxxxxxxx");
        buf.push(0x1e);
        buf.push(TERMINATOR);
        let err = ServerPacket::parse(&buf).unwrap_err();
        assert!(err.to_string().contains("fragments"));
    }

    #[test]
    fn json_view() {
        let frame = server_frame(0x06, "GetServerSelectedTabKind", 5, b"{\"ServerSelectedTabKind\":\"Invalid\"}");
        let pkt = ServerPacket::parse(&frame).unwrap();
        let view = pkt.to_json();
        assert_eq!(view["type"], "success");
        assert_eq!(view["command"], "GetServerSelectedTabKind");
        assert_eq!(view["serial"], 5);
        assert_eq!(view["detail"]["ServerSelectedTabKind"], "Invalid");
    }
}
