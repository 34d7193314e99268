//! Named close codes sent by the remote voice-control service.

/// A close code recognised by this library's reconnect policy.
///
/// Unrecognised codes are treated as retryable by [`CloseCode::should_resume`]'s
/// caller, matching the teacher's "assume transient unless proven otherwise" stance
/// for codes the server hasn't told us about yet.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum CloseCode {
    /// Invalid opcode was sent.
    UnknownOpcode,
    /// A payload was sent prior to identifying.
    NotAuthenticated,
    /// The token sent with the identify payload was incorrect.
    AuthenticationFailed,
    /// More than one identify payload was sent.
    AlreadyAuthenticated,
    /// The session is no longer valid.
    SessionInvalid,
    /// A session timed out.
    SessionTimeout,
    /// The server for the last connection attempt could not be found.
    ServerNotFound,
    /// The remote did not recognise the selected protocol.
    UnknownProtocol,
    /// Disconnected, either due to channel closure/removal or a kick.
    ///
    /// Should not reconnect.
    Disconnected,
    /// The voice server backing this session crashed.
    ///
    /// Should resume.
    VoiceServerCrash,
    /// The remote didn't recognise the requested encryption mode.
    UnknownEncryptionMode,
}

impl CloseCode {
    /// Maps a raw numeric close code to a known variant, if any.
    pub fn from_u16(raw: u16) -> Option<Self> {
        use CloseCode::*;
        Some(match raw {
            4001 => UnknownOpcode,
            4003 => NotAuthenticated,
            4004 => AuthenticationFailed,
            4005 => AlreadyAuthenticated,
            4006 => SessionInvalid,
            4009 => SessionTimeout,
            4011 => ServerNotFound,
            4012 => UnknownProtocol,
            4014 => Disconnected,
            4015 => VoiceServerCrash,
            4016 => UnknownEncryptionMode,
            _ => return None,
        })
    }

    /// Whether a connection closed with this code should be resumed (vs. torn
    /// down permanently).
    pub fn should_resume(self) -> bool {
        use CloseCode::*;
        matches!(self, SessionTimeout | VoiceServerCrash)
    }

    /// Whether a clean, non-retryable disconnect (kick/channel removal) occurred.
    pub fn is_clean_disconnect(self) -> bool {
        matches!(self, CloseCode::Disconnected)
    }
}
