//! Wire model for the voice-control gateway protocol: opcodes, close codes,
//! and the [`Payload`](payload::Payload) codec built on top of them.

pub mod close_code;
pub mod opcode;
pub mod payload;
pub mod protocol_data;

pub use close_code::CloseCode;
pub use opcode::OpCode;
pub use payload::{DecodeError, EncodeError, Payload};
pub use protocol_data::ProtocolData;
