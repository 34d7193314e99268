//! The handshake itself: `IDENTIFY`/`RESUME` over the websocket, IP discovery
//! and `SELECT_PROTOCOL` over UDP, and the resulting `SESSION_DESCRIPTION`.

pub mod error;

use crate::constants::VOICE_GATEWAY_VERSION;
use crate::driver::config::GatewayOptions;
use crate::driver::crypto::CryptoMode;
use crate::driver::socket;
use crate::driver::tasks::Interconnect;
use crate::events::GatewayEvent;
use crate::info::{SessionDescription, VoiceServerOptions};
use crate::model::payload::{Identify, ProtocolData, Resume, SelectProtocol};
use crate::model::Payload;
use crate::ws::{self, ReceiverExt, SenderExt, WsStream};
use crypto_secretbox::{KeyInit, XSalsa20Poly1305 as Cipher};
use error::{Error, Result};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, instrument};
use url::Url;

/// Everything learned during a fresh (non-resumed) handshake.
pub(crate) struct Handshake {
    pub ws: WsStream,
    pub ssrc: u32,
    pub udp: UdpSocket,
    pub cipher: Cipher,
    pub mode: CryptoMode,
    pub heartbeat_interval: Duration,
    pub session_description: SessionDescription,
}

/// Performs `IDENTIFY` → `READY`/`HELLO` → IP discovery → `SELECT_PROTOCOL`
/// → `SESSION_DESCRIPTION`, bounded by `config.driver_timeout` if set.
///
/// Every payload the gateway exchanges along the way is also published on
/// `interconnect` as a [`GatewayEvent`], so a caller doing the happy-path
/// handshake can observe `Hello`, `Ready`, `SelectProtocol` and
/// `SessionDescription` in wire order.
#[instrument(skip(opts, config, interconnect))]
pub(crate) async fn identify(
    opts: &VoiceServerOptions,
    config: &GatewayOptions,
    interconnect: &Interconnect,
) -> Result<Handshake> {
    match config.driver_timeout {
        Some(t) => timeout(t, identify_inner(opts, config, interconnect)).await?,
        None => identify_inner(opts, config, interconnect).await,
    }
}

async fn identify_inner(
    opts: &VoiceServerOptions,
    config: &GatewayOptions,
    interconnect: &Interconnect,
) -> Result<Handshake> {
    let url = generate_url(&opts.endpoint)?;
    let mut client = ws::connect(url).await?;

    client
        .send_json(&Payload::Identify(Identify {
            guild_id: opts.guild_id.0,
            self_id: opts.user_id.0,
            session_id: opts.session_id.clone(),
            token: opts.token.clone(),
        }))
        .await?;

    let mut hello = None;
    let mut ready = None;

    loop {
        let Some(value) = client.recv_json().await? else {
            continue;
        };

        match value {
            Payload::Ready(r) => {
                interconnect.fire(GatewayEvent::Ready {
                    ssrc: r.ssrc,
                    ip: r.ip,
                    port: r.port,
                    modes: r.modes.clone(),
                });
                ready = Some(r);
                if hello.is_some() {
                    break;
                }
            },
            Payload::Hello(h) => {
                interconnect.fire(GatewayEvent::Hello {
                    heartbeat_interval: Duration::from_secs_f64(h.heartbeat_interval_ms / 1000.0),
                });
                hello = Some(h);
                if ready.is_some() {
                    break;
                }
            },
            other => debug!("expected ready/hello during identify; got: {other:?}"),
        }
    }

    let hello = hello.expect("Hello is guaranteed by the loop exit condition above");
    let ready = ready.expect("Ready is guaranteed by the loop exit condition above");

    if !ready.modes.iter().any(|m| m == config.crypto_mode.to_request_str()) {
        return Err(Error::CryptoModeUnavailable);
    }

    let udp = socket::setup((ready.ip, ready.port).into()).await?;
    let discovered = socket::perform_ip_discovery(
        &udp,
        ready.ssrc,
        config.ip_discovery_timeout,
        config.ip_discovery_retries,
    )
    .await?;

    let mode = config.crypto_mode.to_request_str();
    client
        .send_json(&Payload::SelectProtocol(SelectProtocol {
            protocol: "udp".into(),
            data: ProtocolData { address: discovered.address, mode: mode.into(), port: discovered.port },
        }))
        .await?;
    interconnect.fire(GatewayEvent::SelectProtocol {
        address: discovered.address,
        port: discovered.port,
        mode: mode.into(),
    });

    let (cipher, session_description) =
        await_session_description(&mut client, ready.ssrc, config.crypto_mode, interconnect).await?;

    info!("connected to {}", opts.endpoint);

    Ok(Handshake {
        ws: client,
        ssrc: ready.ssrc,
        udp,
        cipher,
        mode: config.crypto_mode,
        heartbeat_interval: Duration::from_secs_f64(hello.heartbeat_interval_ms / 1000.0),
        session_description,
    })
}

/// Performs `RESUME` → `RESUMED`/`HELLO` against an existing session, reusing
/// the UDP socket and cipher from the prior attempt.
#[instrument(skip(opts, config, interconnect))]
pub(crate) async fn resume(
    opts: &VoiceServerOptions,
    config: &GatewayOptions,
    interconnect: &Interconnect,
) -> Result<(WsStream, Duration)> {
    match config.driver_timeout {
        Some(t) => timeout(t, resume_inner(opts, interconnect)).await?,
        None => resume_inner(opts, interconnect).await,
    }
}

async fn resume_inner(
    opts: &VoiceServerOptions,
    interconnect: &Interconnect,
) -> Result<(WsStream, Duration)> {
    let url = generate_url(&opts.endpoint)?;
    let mut client = ws::connect(url).await?;

    client
        .send_json(&Payload::Resume(Resume {
            guild_id: opts.guild_id.0,
            self_id: opts.user_id.0,
            session_id: opts.session_id.clone(),
        }))
        .await?;

    let mut hello = None;
    let mut resumed = false;

    loop {
        let Some(value) = client.recv_json().await? else {
            continue;
        };

        match value {
            Payload::Resumed => {
                resumed = true;
                if hello.is_some() {
                    break;
                }
            },
            Payload::Hello(h) => {
                interconnect.fire(GatewayEvent::Hello {
                    heartbeat_interval: Duration::from_secs_f64(h.heartbeat_interval_ms / 1000.0),
                });
                hello = Some(h);
                if resumed {
                    break;
                }
            },
            other => debug!("expected resumed/hello during resume; got: {other:?}"),
        }
    }

    let hello = hello.expect("Hello is guaranteed by the loop exit condition above");

    info!("resumed session against {}", opts.endpoint);

    Ok((client, Duration::from_secs_f64(hello.heartbeat_interval_ms / 1000.0)))
}

fn generate_url(endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.strip_suffix(":80").unwrap_or(endpoint);
    Url::parse(&format!("wss://{endpoint}/?v={VOICE_GATEWAY_VERSION}")).or(Err(Error::EndpointUrl))
}

async fn await_session_description(
    client: &mut WsStream,
    ssrc: u32,
    mode: CryptoMode,
    interconnect: &Interconnect,
) -> Result<(Cipher, SessionDescription)> {
    loop {
        let Some(value) = client.recv_json().await? else {
            continue;
        };

        match value {
            Payload::SessionDescription(desc) => {
                if desc.mode != mode.to_request_str() {
                    return Err(Error::CryptoModeInvalid);
                }

                let cipher = Cipher::new_from_slice(&desc.secret_key).map_err(|_| Error::CryptoInvalidLength)?;
                let secret_key: [u8; 32] = desc
                    .secret_key
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::CryptoInvalidLength)?;
                let session_description = SessionDescription { ssrc, mode: desc.mode, secret_key };

                interconnect.fire(GatewayEvent::SessionDescription(session_description.clone()));

                return Ok((cipher, session_description));
            },
            other => debug!("expected session description; got: {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_url_strips_the_port_80_suffix() {
        let url = generate_url("voice.example.com:80").unwrap();
        assert_eq!(url.host_str(), Some("voice.example.com"));
        assert_eq!(url.query(), Some(format!("v={VOICE_GATEWAY_VERSION}").as_str()));
    }

    #[test]
    fn generate_url_leaves_other_ports_alone() {
        let url = generate_url("voice.example.com:443").unwrap();
        assert_eq!(url.host_str(), Some("voice.example.com"));
    }
}
