//! The UDP media-plane socket: binding, connecting to the negotiated remote,
//! and performing IP discovery so a client behind NAT learns the address the
//! remote sees it as.

use crate::driver::connection::error::{Error, Result};
use discortp::discord::{IpDiscoveryPacket, IpDiscoveryType, MutableIpDiscoveryPacket};
use socket2::Socket;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Binds a UDP socket and connects it to `remote`.
///
/// Mirrors the zero-receive-buffer optimisation used when this client never
/// reads inbound media: the OS is told not to bother queuing datagrams this
/// process will never drain.
pub(crate) async fn setup(remote: SocketAddr) -> Result<UdpSocket> {
    let udp = UdpSocket::bind("0.0.0.0:0").await?;
    let socket = Socket::from(udp.into_std()?);

    #[cfg(not(target_os = "macos"))]
    socket.set_recv_buffer_size(0)?;

    let udp = UdpSocket::from_std(socket.into())?;
    udp.connect(remote).await?;
    Ok(udp)
}

/// Result of a successful IP discovery round trip: the address/port the
/// remote observes for this socket's outbound traffic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct DiscoveredAddr {
    pub address: IpAddr,
    pub port: u16,
}

/// Performs IP discovery against an already-connected socket, retrying up to
/// `retries` times (in addition to the first attempt) if no reply arrives
/// within `per_attempt_timeout`.
pub(crate) async fn perform_ip_discovery(
    udp: &UdpSocket,
    ssrc: u32,
    per_attempt_timeout: Duration,
    retries: usize,
) -> Result<DiscoveredAddr> {
    let mut request = [0u8; IpDiscoveryPacket::const_packet_size()];
    {
        let mut view = MutableIpDiscoveryPacket::new(&mut request[..]).expect(
            "Too few bytes in 'request' for IPDiscovery packet. \
                (Blame: IpDiscoveryPacket::const_packet_size()?)",
        );
        view.set_pkt_type(IpDiscoveryType::Request);
        view.set_length(70);
        view.set_ssrc(ssrc);
    }

    let mut attempt = 0;
    loop {
        udp.send(&request).await?;

        let mut response = [0u8; IpDiscoveryPacket::const_packet_size()];
        let recv = timeout(per_attempt_timeout, udp.recv(&mut response)).await;

        let len = match recv {
            Ok(Ok(len)) => len,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) if attempt < retries => {
                attempt += 1;
                continue;
            },
            Err(_) => return Err(Error::TimedOut),
        };

        return match parse_discovery_response(&response[..len]) {
            Ok(addr) => Ok(addr),
            Err(e) if attempt < retries => {
                attempt += 1;
                let _ = e;
                continue;
            },
            Err(e) => Err(e),
        };
    }
}

fn parse_discovery_response(bytes: &[u8]) -> Result<DiscoveredAddr> {
    let view = IpDiscoveryPacket::new(bytes).ok_or(Error::IllegalDiscoveryResponse)?;

    if view.get_pkt_type() != IpDiscoveryType::Response {
        return Err(Error::IllegalDiscoveryResponse);
    }

    // Binary search for a "left edge" of NUL bytes would assume a trusted
    // sender; don't make that assumption over UDP.
    let nul_byte_index = view
        .get_address_raw()
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::IllegalIp)?;

    let address_str = std::str::from_utf8(&view.get_address_raw()[..nul_byte_index])
        .map_err(|_| Error::IllegalIp)?;

    let address = IpAddr::from_str(address_str).map_err(|_| Error::IllegalIp)?;

    Ok(DiscoveredAddr { address, port: view.get_port() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_response(addr: &str, port: u16) -> [u8; IpDiscoveryPacket::const_packet_size()] {
        let mut buf = [0u8; IpDiscoveryPacket::const_packet_size()];
        let mut view = MutableIpDiscoveryPacket::new(&mut buf[..]).unwrap();
        view.set_pkt_type(IpDiscoveryType::Response);
        view.set_length(70);
        let addr_bytes = addr.as_bytes();
        view.set_address_raw(addr_bytes);
        view.set_port(port);
        buf
    }

    #[test]
    fn parses_a_well_formed_response() {
        let buf = build_response("203.0.113.7", 6420);
        let parsed = parse_discovery_response(&buf).unwrap();
        assert_eq!(parsed.address, IpAddr::from_str("203.0.113.7").unwrap());
        assert_eq!(parsed.port, 6420);
    }

    #[test]
    fn rejects_a_request_type_packet() {
        let mut buf = [0u8; IpDiscoveryPacket::const_packet_size()];
        let mut view = MutableIpDiscoveryPacket::new(&mut buf[..]).unwrap();
        view.set_pkt_type(IpDiscoveryType::Request);
        view.set_length(70);
        assert!(matches!(parse_discovery_response(&buf), Err(Error::IllegalDiscoveryResponse)));
    }

    #[test]
    fn rejects_a_response_with_no_nul_terminator() {
        let mut buf = build_response("203.0.113.7", 6420);
        // Overwrite the whole address field with non-NUL bytes.
        let mut view = MutableIpDiscoveryPacket::new(&mut buf[..]).unwrap();
        let filled = vec![b'9'; view.get_address_raw().len()];
        view.set_address_raw(&filled);
        assert!(matches!(parse_discovery_response(&buf), Err(Error::IllegalIp)));
    }
}
