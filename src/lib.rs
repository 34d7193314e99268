//! An async client for a Discord-style voice-control gateway: session
//! negotiation over a JSON websocket, RTP-style media transport over UDP,
//! and the reconnect/resume machinery that keeps a session alive across
//! transient network loss and voice server migrations.
//!
//! The entry point is [`GatewayClient`]: build one with a
//! [`VoiceServerOptions`] and a [`GatewayOptions`], call
//! [`start`](GatewayClient::start), and interact with the returned
//! [`ConnectionHandle`] to observe [`GatewayEvent`]s, the session's
//! [`State`], and to request a reconnect, migration, or disconnect.
//!
//! Encoding, mixing, decoding and dispatching actual audio is out of scope;
//! plug a [`SendTaskFactory`]/[`ReceiveTaskFactory`] into [`GatewayOptions`]
//! to wire the negotiated UDP transport up to whatever does that for you.

mod constants;
mod events;
mod handle;
mod id;
mod info;
mod model;
mod ws;

pub mod driver;

pub use driver::audio::{
    MediaTransport,
    NoopReceiveTaskFactory,
    NoopSendTaskFactory,
    ReceiveTaskFactory,
    SendTaskFactory,
    SpeakingSender,
};
pub use driver::config::{ChannelRetrieveTask, GatewayOptions, NoopChannelRetrieveTask};
pub use driver::connection::error::{Error, Result};
pub use driver::crypto::CryptoMode;
pub use driver::retry::{ExponentialBackoff, Retry, Strategy};
pub use driver::state::State;
pub use events::GatewayEvent;
pub use handle::{ConnectionHandle, GatewayClient};
pub use id::{ChannelId, GuildId, UserId};
pub use info::{SessionDescription, VoiceServerOptions};
