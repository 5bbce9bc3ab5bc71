mod codec;
mod command;
mod handshake;
mod packet;
mod reply;
mod response;

pub use codec::PacketCodec;
pub use command::{has_master_hint, ClientCommand};
pub use handshake::{compute_auth_response, HandshakeResponse, InitialHandshake};
pub use packet::{capabilities, is_err_packet, is_ok_packet, status_flags, Command, Packet};
pub use reply::{EofPacket, ErrPacket, OkPacket};
pub use response::{ResponseError, ResponseEvent, ResponseTracker};
