//! Typed control-plane payloads and their `{"op": .., "d": ..}` wire encoding.
//!
//! This is the Payload Codec: [`Payload::encode`] and [`Payload::decode`] are the
//! only two operations a caller needs. Decoding is lenient for opcodes this
//! library doesn't recognise (they become [`Payload::Unknown`]); a recognised
//! opcode whose body fails to parse is a hard error, since that indicates a
//! protocol-level disagreement rather than forward-compatible drift.

use crate::id::UserId;
use crate::model::opcode::OpCode;
use crate::model::protocol_data::ProtocolData;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;
use std::net::IpAddr;

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Identify {
    pub guild_id: u64,
    pub self_id: u64,
    pub session_id: String,
    pub token: String,
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Resume {
    pub guild_id: u64,
    pub self_id: u64,
    pub session_id: String,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Heartbeat {
    pub nonce: u64,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct HeartbeatAck {
    pub nonce: u64,
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct SelectProtocol {
    pub protocol: String,
    pub data: ProtocolData,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Speaking {
    pub flags: u32,
    pub delay: u32,
    pub ssrc: u32,
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Hello {
    pub heartbeat_interval_ms: f64,
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Ready {
    pub ssrc: u32,
    pub ip: IpAddr,
    pub port: u16,
    pub modes: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct SessionDescription {
    pub mode: String,
    pub secret_key: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ClientConnect {
    pub user_id: UserId,
    pub audio_ssrc: u32,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ClientDisconnect {
    pub user_id: UserId,
}

/// An inbound frame whose opcode this library does not recognise.
///
/// Preserved verbatim so forward-compatible servers don't kill the session;
/// see [P2 in the testable-properties spec].
#[derive(Clone, Debug)]
pub struct Unknown {
    pub opcode: u8,
    pub raw: serde_json::Value,
}

// `serde_json::Value` doesn't implement `Eq`/`Hash`; Unknown is compared/hashed
// by opcode alone, which is all P2 cares about.
impl PartialEq for Unknown {
    fn eq(&self, other: &Self) -> bool {
        self.opcode == other.opcode && self.raw == other.raw
    }
}
impl Eq for Unknown {}

/// A decoded control-plane payload, in either direction.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Payload {
    Identify(Identify),
    SelectProtocol(SelectProtocol),
    Ready(Ready),
    Heartbeat(Heartbeat),
    SessionDescription(SessionDescription),
    Speaking(Speaking),
    HeartbeatAck(HeartbeatAck),
    Resume(Resume),
    Hello(Hello),
    Resumed,
    ClientConnect(ClientConnect),
    ClientDisconnect(ClientDisconnect),
    Unknown(Unknown),
}

impl Payload {
    fn opcode(&self) -> Option<OpCode> {
        use Payload::*;
        Some(match self {
            Identify(_) => OpCode::Identify,
            SelectProtocol(_) => OpCode::SelectProtocol,
            Ready(_) => OpCode::Ready,
            Heartbeat(_) => OpCode::Heartbeat,
            SessionDescription(_) => OpCode::SessionDescription,
            Speaking(_) => OpCode::Speaking,
            HeartbeatAck(_) => OpCode::HeartbeatAck,
            Resume(_) => OpCode::Resume,
            Hello(_) => OpCode::Hello,
            Resumed => OpCode::Resumed,
            ClientConnect(_) => OpCode::ClientConnect,
            ClientDisconnect(_) => OpCode::ClientDisconnect,
            Unknown(_) => return None,
        })
    }

    /// Serializes a payload to its `{"op": .., "d": ..}` wire form.
    ///
    /// Fails only if the payload's inner data cannot be represented as JSON,
    /// which for the closed set of known variants here should never happen in
    /// practice; callers should treat an `Err` as a fatal, non-retryable bug.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        use Payload::*;

        let Some(op) = self.opcode() else {
            return Err(EncodeError::UnknownVariant);
        };

        let d = match self {
            Identify(p) => serde_json::to_value(p),
            SelectProtocol(p) => serde_json::to_value(p),
            Ready(p) => serde_json::to_value(p),
            Heartbeat(p) => serde_json::to_value(p),
            SessionDescription(p) => serde_json::to_value(p),
            Speaking(p) => serde_json::to_value(p),
            HeartbeatAck(p) => serde_json::to_value(p),
            Resume(p) => serde_json::to_value(p),
            Hello(p) => serde_json::to_value(p),
            Resumed => Ok(serde_json::Value::Null),
            ClientConnect(p) => serde_json::to_value(p),
            ClientDisconnect(p) => serde_json::to_value(p),
            Unknown(_) => return Err(EncodeError::UnknownVariant),
        }
        .map_err(EncodeError::Json)?;

        let envelope = serde_json::json!({ "op": op as u8, "d": d });
        serde_json::to_vec(&envelope).map_err(EncodeError::Json)
    }

    /// Decodes a wire frame into a [`Payload`].
    ///
    /// An opcode this library doesn't recognise becomes [`Payload::Unknown`]
    /// rather than an error (P2); a recognised opcode whose `d` fails to parse
    /// against its known shape is a [`DecodeError::Malformed`], which callers
    /// should treat as a non-retryable protocol error.
    pub fn decode(bytes: &[u8]) -> Result<Payload, DecodeError> {
        #[derive(Deserialize)]
        struct Envelope<'a> {
            op: u8,
            #[serde(borrow)]
            d: Option<&'a RawValue>,
        }

        let envelope: Envelope = serde_json::from_slice(bytes).map_err(DecodeError::Envelope)?;
        let raw = envelope.d.map(|v| v.get()).unwrap_or("null");

        let Some(op) = OpCode::from_u8(envelope.op) else {
            let raw_value = serde_json::from_str(raw).unwrap_or(serde_json::Value::Null);
            return Ok(Payload::Unknown(Unknown {
                opcode: envelope.op,
                raw: raw_value,
            }));
        };

        let malformed = |e: serde_json::Error| DecodeError::Malformed { opcode: op, source: e };

        Ok(match op {
            OpCode::Identify => Payload::Identify(serde_json::from_str(raw).map_err(malformed)?),
            OpCode::SelectProtocol =>
                Payload::SelectProtocol(serde_json::from_str(raw).map_err(malformed)?),
            OpCode::Ready => Payload::Ready(serde_json::from_str(raw).map_err(malformed)?),
            OpCode::Heartbeat => Payload::Heartbeat(serde_json::from_str(raw).map_err(malformed)?),
            OpCode::SessionDescription =>
                Payload::SessionDescription(serde_json::from_str(raw).map_err(malformed)?),
            OpCode::Speaking => Payload::Speaking(serde_json::from_str(raw).map_err(malformed)?),
            OpCode::HeartbeatAck =>
                Payload::HeartbeatAck(serde_json::from_str(raw).map_err(malformed)?),
            OpCode::Resume => Payload::Resume(serde_json::from_str(raw).map_err(malformed)?),
            OpCode::Hello => Payload::Hello(serde_json::from_str(raw).map_err(malformed)?),
            OpCode::Resumed => Payload::Resumed,
            OpCode::ClientConnect =>
                Payload::ClientConnect(serde_json::from_str(raw).map_err(malformed)?),
            OpCode::ClientDisconnect =>
                Payload::ClientDisconnect(serde_json::from_str(raw).map_err(malformed)?),
        })
    }
}

/// Failure while serializing a [`Payload`] to its wire form.
#[derive(Debug)]
pub enum EncodeError {
    Json(serde_json::Error),
    /// Attempted to encode a value that has no wire representation (`Unknown`).
    UnknownVariant,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::Json(e) => write!(f, "failed to encode payload: {e}"),
            EncodeError::UnknownVariant => write!(f, "cannot encode an Unknown/non-wire payload"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Failure while decoding a wire frame into a [`Payload`].
///
/// Only [`DecodeError::Malformed`] represents a *known* opcode with a body
/// that failed to parse; this is the only variant callers should treat as a
/// non-retryable protocol error.
#[derive(Debug)]
pub enum DecodeError {
    /// The `{"op": .., "d": ..}` envelope itself was not valid JSON.
    Envelope(serde_json::Error),
    /// A known opcode's body did not match its expected shape.
    Malformed { opcode: OpCode, source: serde_json::Error },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Envelope(e) => write!(f, "invalid payload envelope: {e}"),
            DecodeError::Malformed { opcode, source } =>
                write!(f, "malformed payload for opcode {opcode:?}: {source}"),
        }
    }
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn known_payloads() -> Vec<Payload> {
        vec![
            Payload::Identify(Identify {
                guild_id: 1,
                self_id: 2,
                session_id: "sesh".into(),
                token: "tok".into(),
            }),
            Payload::SelectProtocol(SelectProtocol {
                protocol: "udp".into(),
                data: ProtocolData {
                    address: IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)),
                    mode: "xsalsa20_poly1305".into(),
                    port: 6000,
                },
            }),
            Payload::Ready(Ready {
                ssrc: 12345,
                ip: IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)),
                port: 5000,
                modes: vec!["xsalsa20_poly1305".into()],
            }),
            Payload::Heartbeat(Heartbeat { nonce: 42 }),
            Payload::SessionDescription(SessionDescription {
                mode: "xsalsa20_poly1305".into(),
                secret_key: vec![0; 32],
            }),
            Payload::Speaking(Speaking { flags: 1, delay: 0, ssrc: 12345 }),
            Payload::HeartbeatAck(HeartbeatAck { nonce: 42 }),
            Payload::Resume(Resume { guild_id: 1, self_id: 2, session_id: "sesh".into() }),
            Payload::Hello(Hello { heartbeat_interval_ms: 41250.0 }),
            Payload::Resumed,
            Payload::ClientConnect(ClientConnect { user_id: UserId(7), audio_ssrc: 9 }),
            Payload::ClientDisconnect(ClientDisconnect { user_id: UserId(7) }),
        ]
    }

    #[test]
    fn round_trips_every_known_payload() {
        for payload in known_payloads() {
            let bytes = payload.encode().expect("encode should succeed");
            let decoded = Payload::decode(&bytes).expect("decode should succeed");
            assert_eq!(payload, decoded, "round-trip mismatch for {payload:?}");
        }
    }

    #[test]
    fn unknown_opcode_decodes_leniently() {
        let frame = br#"{"op": 250, "d": {"anything": "goes"}}"#;
        let decoded = Payload::decode(frame).expect("unknown opcode should not error");
        match decoded {
            Payload::Unknown(Unknown { opcode, .. }) => assert_eq!(opcode, 250),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn known_opcode_with_malformed_body_is_hard_error() {
        let frame = br#"{"op": 2, "d": {"ssrc": "not-a-number"}}"#;
        let err = Payload::decode(frame).expect_err("malformed Ready body should fail");
        assert!(matches!(err, DecodeError::Malformed { opcode: OpCode::Ready, .. }));
    }

    #[test]
    fn resumed_has_no_body() {
        let bytes = Payload::Resumed.encode().unwrap();
        let decoded = Payload::decode(&bytes).unwrap();
        assert_eq!(decoded, Payload::Resumed);
    }
}
