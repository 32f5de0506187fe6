//! Client core for the companion remote-control TCP protocol.
//!
//! Pairs with a canvas application advertised through a share URL,
//! speaks its terminator-framed command protocol over TCP, and keeps
//! the session alive across heartbeats and reconnects. Typical flow:
//! decode the URL with [`decode_config`], open a [`Session`] with
//! [`Session::connect`], call [`Session::authenticate`], then issue
//! commands with [`Session::request`].

mod codec;
mod commands;
mod error;
mod obfuscate;
mod packet;
mod pairing;
mod protocol;
mod registry;
mod session;

pub use codec::CompanionCodec;
pub use commands::{
    CanvasSize, Command, HeartbeatDetail, ModifyKeyRequest, ModifyKeyResponse,
    ReadPreviewBlockRequest, ResetCanvasNotice, SelectedTabResponse, UpdateGalleryRequest,
    UpdateGalleryResponse,
};
pub use error::{CompanionError, ResetSide};
pub use obfuscate::{auth_field_hex, make_password, obfuscate_auth_param, obfuscate_remote_param};
pub use packet::{ClientCommand, PacketKind, ServerPacket, MIN_PACKET_LEN};
pub use pairing::{decode_config, PairingConfig, PAIRING_HOST};
pub use protocol::{
    CONNECT_TIMEOUT, DETAIL_SEPARATOR, HEARTBEAT_TIMEOUT, MAX_FRAME_SIZE, PARAM_SEPARATOR,
    PROTOCOL_VERSION_LINE, RECONNECTION_REQUEST_MARKER, TERMINATOR,
};
pub use registry::{Completion, PendingReply, Serial, SerialRegistry};
pub use session::Session;
