//! Handshake errors and convenience types.

use crate::model::DecodeError;
use crate::ws::Error as WsError;
use crypto_secretbox::Error as CryptoError;
use std::{error::Error as StdError, fmt, io::Error as IoError};
use tokio::time::error::Elapsed;

/// Which internal task a dropped channel send was headed for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Recipient {
    WsTask,
    Events,
}

/// Errors encountered while establishing or resuming a gateway connection.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The connection attempt was superseded by another (e.g. a second
    /// `start()`/migration) and was abandoned.
    AttemptDiscarded,
    /// [`GatewayClient::start`](crate::handle::GatewayClient::start) was
    /// called a second time on a client that is already running.
    AlreadyStarted,
    /// A [`ConnectionHandle`](crate::handle::ConnectionHandle) operation that
    /// requires a live session (e.g. `reconnect()`) was attempted while
    /// disconnected.
    NotConnected,
    /// An error occurred during [en/de]cryption of voice packets.
    Crypto(CryptoError),
    /// The symmetric key supplied by the remote had the wrong size.
    CryptoInvalidLength,
    /// Server changed the negotiated encryption mode after the fact.
    CryptoModeInvalid,
    /// Selected crypto mode was not offered by the server.
    CryptoModeUnavailable,
    /// An indicator that an endpoint URL was invalid.
    EndpointUrl,
    /// The remote failed to correctly respond to IP discovery.
    IllegalDiscoveryResponse,
    /// Could not parse the remote's view of our IP.
    IllegalIp,
    /// Miscellaneous I/O error.
    Io(IoError),
    /// A recognised opcode's payload could not be parsed.
    Decode(DecodeError),
    /// Failed to message a background task after connection establishment.
    InterconnectFailure(Recipient),
    /// Error communicating with the gateway over WebSocket.
    Ws(WsError),
    /// Connection attempt timed out.
    TimedOut,
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        Error::Crypto(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Error {
        Error::Io(e)
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Error {
        Error::Decode(e)
    }
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Error {
        Error::Ws(e)
    }
}

impl From<Elapsed> for Error {
    fn from(_e: Elapsed) -> Error {
        Error::TimedOut
    }
}

impl Error {
    /// Whether a driver encountering this error should attempt to reconnect,
    /// as opposed to surfacing it to the caller and giving up.
    ///
    /// Distinct from [`crate::model::CloseCode::should_resume`]: this covers
    /// handshake-level failures that never got far enough to receive a close
    /// code at all (e.g. a timed-out IP discovery, a dropped TCP connection).
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::AttemptDiscarded
                | Error::AlreadyStarted
                | Error::NotConnected
                | Error::CryptoModeUnavailable
                | Error::CryptoModeInvalid
                | Error::CryptoInvalidLength
                | Error::EndpointUrl
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to connect to voice gateway: ")?;
        match self {
            Self::AttemptDiscarded => write!(f, "connection attempt was aborted/discarded"),
            Self::AlreadyStarted => write!(f, "client has already been started"),
            Self::NotConnected => write!(f, "no active connection to act on"),
            Self::Crypto(e) => e.fmt(f),
            Self::CryptoInvalidLength => write!(f, "server supplied key of wrong length"),
            Self::CryptoModeInvalid => write!(f, "server changed negotiated encryption mode"),
            Self::CryptoModeUnavailable => write!(f, "server did not offer chosen encryption mode"),
            Self::EndpointUrl => write!(f, "endpoint URL received from gateway was invalid"),
            Self::IllegalDiscoveryResponse =>
                write!(f, "IP discovery response was invalid"),
            Self::IllegalIp => write!(f, "IP discovery response had a bad IP value"),
            Self::Io(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::InterconnectFailure(e) => write!(f, "failed to contact other task ({e:?})"),
            Self::Ws(e) => write!(f, "websocket issue ({e})."),
            Self::TimedOut => write!(f, "connection attempt timed out"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::AttemptDiscarded
            | Error::AlreadyStarted
            | Error::NotConnected
            | Error::CryptoInvalidLength
            | Error::CryptoModeInvalid
            | Error::CryptoModeUnavailable
            | Error::EndpointUrl
            | Error::IllegalDiscoveryResponse
            | Error::IllegalIp
            | Error::InterconnectFailure(_)
            | Error::TimedOut => None,
            Error::Crypto(e) => e.source(),
            Error::Io(e) => e.source(),
            Error::Decode(e) => e.source(),
            Error::Ws(e) => e.source(),
        }
    }
}

/// Convenience type for gateway connection error handling.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_unavailable_is_not_retryable() {
        assert!(!Error::CryptoModeUnavailable.is_retryable());
    }

    #[test]
    fn io_errors_are_retryable() {
        assert!(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")).is_retryable());
    }

    #[test]
    fn timed_out_is_retryable() {
        assert!(Error::TimedOut.is_retryable());
    }

    #[test]
    fn already_started_is_not_retryable() {
        assert!(!Error::AlreadyStarted.is_retryable());
    }

    #[test]
    fn not_connected_is_not_retryable() {
        assert!(!Error::NotConnected.is_retryable());
    }
}
