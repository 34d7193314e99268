//! Constants affecting gateway and driver behaviour.

use discortp::rtp::RtpType;
use std::time::Duration;

/// The voice gateway version used by this library.
pub const VOICE_GATEWAY_VERSION: u8 = 4;

/// The one (and only) RTP version used on the wire.
pub const RTP_VERSION: u8 = 2;

/// Profile type used by the media traffic carried over this gateway.
pub const RTP_PROFILE_TYPE: RtpType = RtpType::Dynamic(120);

/// Size in bytes of a discovery request/response packet.
pub const IP_DISCOVERY_PACKET_LEN: usize = 74;

/// Length in bytes of the address field within a discovery packet.
pub const IP_DISCOVERY_ADDRESS_LEN: usize = 64;

/// Default amount of time to wait for a single IP discovery round trip.
pub const DEFAULT_IP_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of IP discovery attempts before giving up.
pub const DEFAULT_IP_DISCOVERY_RETRIES: usize = 5;

/// Default amount of time to wait for an attempted connection before it is abandoned.
pub const DEFAULT_DRIVER_TIMEOUT: Duration = Duration::from_secs(10);
