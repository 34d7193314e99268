use serde_repr::{Deserialize_repr, Serialize_repr};

/// Numeric opcode appearing on the wire as the `"op"` field of every frame.
#[derive(Clone, Copy, Debug, Deserialize_repr, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize_repr)]
#[repr(u8)]
pub enum OpCode {
    /// Used to begin a voice websocket connection.
    Identify = 0,
    /// Used to select the voice protocol.
    SelectProtocol = 1,
    /// Used to complete the websocket handshake.
    Ready = 2,
    /// Used to keep the websocket connection alive.
    Heartbeat = 3,
    /// Used to describe the session.
    SessionDescription = 4,
    /// Used to indicate which users are speaking.
    Speaking = 5,
    /// Heartbeat ACK, received to show the server's receipt of a heartbeat.
    HeartbeatAck = 6,
    /// Sent after a disconnect to attempt to resume a session.
    Resume = 7,
    /// Used to determine how often the client must send a heartbeat.
    Hello = 8,
    /// Sent by the server if a session could successfully be resumed.
    Resumed = 9,
    /// Message indicating that another user has connected to the channel.
    ClientConnect = 12,
    /// Message indicating that another user has disconnected from the channel.
    ClientDisconnect = 13,
}

impl OpCode {
    /// Maps a raw wire opcode to a known variant, if any.
    pub fn from_u8(raw: u8) -> Option<Self> {
        use OpCode::*;
        Some(match raw {
            0 => Identify,
            1 => SelectProtocol,
            2 => Ready,
            3 => Heartbeat,
            4 => SessionDescription,
            5 => Speaking,
            6 => HeartbeatAck,
            7 => Resume,
            8 => Hello,
            9 => Resumed,
            12 => ClientConnect,
            13 => ClientDisconnect,
            _ => return None,
        })
    }
}
