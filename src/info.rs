//! Connection parameters handed to a gateway session, and the session
//! identifier the server hands back during `IDENTIFY`/`RESUME`.

use crate::id::{ChannelId, GuildId, UserId};
use std::fmt::{Debug, Formatter, Result as FmtResult};

/// Everything needed to open (or resume) a voice-control session.
///
/// `Debug` redacts [`token`](Self::token) so this can be logged at `debug`
/// level without leaking credentials; see the redaction property in the
/// testable-properties list.
#[derive(Clone)]
pub struct VoiceServerOptions {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    /// Session id handed out by the signalling layer that preceded this
    /// gateway connection (not the voice session id from `READY`).
    pub session_id: String,
    pub token: String,
    /// `wss://` endpoint for the voice-control websocket.
    pub endpoint: String,
}

impl Debug for VoiceServerOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VoiceServerOptions")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("token", &"<secret>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// State accumulated during the handshake that a resumed connection needs to
/// carry forward: the ssrc, secret key and negotiated encryption mode.
#[derive(Clone)]
pub struct SessionDescription {
    pub ssrc: u32,
    pub mode: String,
    pub secret_key: [u8; 32],
}

impl Debug for SessionDescription {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SessionDescription")
            .field("ssrc", &self.ssrc)
            .field("mode", &self.mode)
            .field("secret_key", &"<secret>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_redacted_in_debug_output() {
        let opts = VoiceServerOptions {
            guild_id: GuildId(1),
            channel_id: ChannelId(2),
            user_id: UserId(3),
            session_id: "sesh".into(),
            token: "super-secret-token".into(),
            endpoint: "wss://example.invalid".into(),
        };

        let rendered = format!("{opts:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains("<secret>"));
    }

    #[test]
    fn secret_key_is_redacted_in_debug_output() {
        let desc = SessionDescription { ssrc: 1, mode: "xsalsa20_poly1305".into(), secret_key: [7; 32] };
        let rendered = format!("{desc:?}");
        assert!(!rendered.contains('7'));
        assert!(rendered.contains("<secret>"));
    }
}
