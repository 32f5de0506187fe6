//! Terminator-framed codec for the companion protocol.
//!
//! Frames are delimited by a single NUL byte rather than a length
//! prefix, so the decoder scans the read buffer for the next terminator
//! and hands complete frames to the strict packet parser. Two packets
//! arriving in one read are decoded in order.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CompanionError;
use crate::packet::{ClientCommand, ServerPacket};
use crate::protocol::{MAX_FRAME_SIZE, TERMINATOR};

pub struct CompanionCodec;

impl Decoder for CompanionCodec {
    type Item = ServerPacket;
    type Error = CompanionError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|&b| b == TERMINATOR) {
            Some(pos) => {
                let frame = src.split_to(pos + 1);
                Ok(Some(ServerPacket::parse(&frame)?))
            }
            None => {
                if src.len() > MAX_FRAME_SIZE {
                    return Err(CompanionError::Framing(format!(
                        "unterminated frame exceeds {MAX_FRAME_SIZE} bytes"
                    )));
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<ClientCommand> for CompanionCodec {
    type Error = CompanionError;

    fn encode(&mut self, item: ClientCommand, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = item.encode()?;
        dst.reserve(frame.len());
        dst.put_slice(&frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::registry::Serial;
    use serde_json::json;

    fn encoded(command: Command, serial: u32) -> Vec<u8> {
        ClientCommand {
            command,
            serial: Serial(serial),
            detail: Some(json!({"Marker": serial})),
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn partial_frame_waits_for_terminator() {
        let frame = encoded(Command::TellHeartbeat, 1);
        let mut buf = BytesMut::from(&frame[..frame.len() - 1]);

        let mut codec = CompanionCodec;
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.put_u8(TERMINATOR);
        let pkt = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(pkt.serial, Serial(1));
        assert!(buf.is_empty());
    }

    #[test]
    fn two_packets_in_one_buffer_decode_in_order() {
        let mut buf = BytesMut::new();
        buf.put_slice(&encoded(Command::TellHeartbeat, 1));
        buf.put_slice(&encoded(Command::GetModifyKeyString, 2));

        let mut codec = CompanionCodec;
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.serial, Serial(1));
        assert_eq!(first.command, Command::TellHeartbeat);
        assert_eq!(second.serial, Serial(2));
        assert_eq!(second.command, Command::GetModifyKeyString);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn encode_roundtrips_through_decode() {
        let mut buf = BytesMut::new();
        let mut codec = CompanionCodec;
        let cmd = ClientCommand {
            command: Command::Authenticate,
            serial: Serial(0),
            detail: Some(json!(["G#1", "aa", "bb"])),
        };
        codec.encode(cmd, &mut buf).unwrap();

        let pkt = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(pkt.command, Command::Authenticate);
        assert_eq!(pkt.serial, Serial(0));
        assert_eq!(pkt.detail, Some(json!(["G#1", "aa", "bb"])));
    }

    #[test]
    fn malformed_frame_is_fatal() {
        let mut buf = BytesMut::from(&b"\x06$garbage\x00"[..]);
        let mut codec = CompanionCodec;
        assert!(codec.decode(&mut buf).is_err());
    }
}
