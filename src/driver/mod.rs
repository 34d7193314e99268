//! The gateway driver: the background task that owns one voice-control
//! session end to end, from the first `IDENTIFY` through every resume,
//! reconnect and eventual disconnect.
//!
//! Everything under this module composes around a single loop in [`runner`]
//! that consumes [`CoreMessage`](tasks::message::CoreMessage)s from a `flume`
//! channel shared between the public [`ConnectionHandle`](crate::handle::ConnectionHandle)
//! and the background websocket task. It owns the session's [`State`],
//! decides (via [`retry::classify`]) whether a dropped connection should
//! resume or restart from scratch, and tears down the previous attempt's
//! tasks via [`AttemptResources`] whenever it does either.

pub mod config;
pub mod crypto;
pub mod retry;
pub mod socket;
pub mod state;

pub(crate) mod audio;
pub(crate) mod connection;
mod heartbeat;
pub(crate) mod tasks;

use self::config::GatewayOptions;
use self::connection::error::{Error, Result};
use self::connection::Handshake;
use self::crypto::CryptoState;
use self::state::State;
use self::tasks::disposal::AttemptResources;
use self::tasks::message::CoreMessage;
use self::tasks::{ws_task, Interconnect};
use crate::info::{SessionDescription, VoiceServerOptions};
use crypto_secretbox::XSalsa20Poly1305 as Cipher;
use flume::Receiver;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, instrument, trace, warn};

/// Everything the driver loop needs to remember about one live (or dormant
/// but not yet torn down) attempt: the negotiated UDP transport, the channel
/// used to push a fresh websocket into the running heartbeat task, and the
/// background tasks themselves.
///
/// `cipher` and `session_description` both carry the session's secret key
/// material; wrapping `cipher` in an `Arc` here (rather than storing it bare)
/// is what lets a test observe that the key becomes unreachable once this
/// whole struct is dropped (Invariant 1 / P5), without any other code ever
/// needing to clone that `Arc`.
struct Session {
    ws_tx: flume::Sender<tasks::message::WsMessage>,
    udp: Arc<UdpSocket>,
    remote: SocketAddr,
    ssrc: u32,
    cipher: Arc<Cipher>,
    crypto_state: CryptoState,
    session_description: SessionDescription,
    resources: AttemptResources,
}

/// Spawns the driver's background task. Returns immediately; the initial
/// connect result is reported on `connected_tx`.
pub(crate) fn start(
    opts: VoiceServerOptions,
    config: GatewayOptions,
    interconnect: Interconnect,
    core_rx: Receiver<CoreMessage>,
    connected_tx: oneshot::Sender<Result<()>>,
) {
    tokio::spawn(async move {
        trace!("gateway driver started");
        runner(opts, config, interconnect, core_rx, connected_tx).await;
        trace!("gateway driver finished");
    });
}

#[instrument(skip(config, interconnect, core_rx, connected_tx))]
async fn runner(
    mut opts: VoiceServerOptions,
    config: GatewayOptions,
    interconnect: Interconnect,
    core_rx: Receiver<CoreMessage>,
    connected_tx: oneshot::Sender<Result<()>>,
) {
    let mut current_state = State::Connecting;
    interconnect.set_state(current_state);

    let mut session = match connect_initial(&opts, &config, &interconnect).await {
        Ok(session) => Some(session),
        Err(e) => {
            warn!("initial connection failed permanently: {e}");
            current_state = State::Disconnected;
            interconnect.set_state(current_state);
            let _ = connected_tx.send(Err(e));
            return;
        },
    };

    current_state = State::Connected;
    interconnect.set_state(current_state);
    let _ = connected_tx.send(Ok(()));

    let mut attempts = 0usize;
    let mut last_wait: Option<Duration> = None;

    while let Ok(msg) = core_rx.recv_async().await {
        match msg {
            CoreMessage::ConnectionLost { close_code } => {
                match retry::classify(
                    close_code,
                    current_state.has_been_connected(),
                    attempts,
                    config.driver_retry.retry_limit,
                ) {
                    retry::Action::Stop => {
                        debug!("connection lost (close code {close_code:?}); not retrying");
                        current_state = State::Disconnected;
                        interconnect.set_state(current_state);
                        break;
                    },
                    retry::Action::Retry(next) => {
                        attempts += 1;
                        let wait = config.driver_retry.wait_before_retry(last_wait);
                        last_wait = Some(wait);
                        debug!("connection lost; retrying as {next:?} in {wait:?}");
                        sleep(wait).await;

                        if matches!(next, State::Connecting) {
                            // Invariant 1: the outgoing session (and the
                            // secret key it owns) must be gone before the
                            // driver publicly re-enters CONNECTING, not just
                            // once a replacement has been negotiated.
                            session = None;
                        }

                        current_state = next;
                        interconnect.set_state(current_state);

                        let outcome = match next {
                            State::Resuming => {
                                let sess = session
                                    .as_mut()
                                    .expect("resuming keeps the existing session alive");
                                resume_session(&opts, &config, &interconnect, sess).await
                            },
                            State::Connecting =>
                                match connect_initial(&opts, &config, &interconnect).await {
                                    Ok(new_session) => {
                                        session = Some(new_session);
                                        Ok(())
                                    },
                                    Err(e) => Err(e),
                                },
                            State::Connected | State::Disconnected =>
                                unreachable!("classify only retries into Resuming/Connecting"),
                        };

                        match outcome {
                            Ok(()) => {
                                attempts = 0;
                                last_wait = None;
                                current_state = State::Connected;
                                interconnect.set_state(current_state);
                            },
                            Err(e) => {
                                warn!("retry attempt failed: {e}");
                                current_state = State::Disconnected;
                                interconnect.set_state(current_state);
                                break;
                            },
                        }
                    },
                }
            },
            CoreMessage::Reconnect => {
                current_state = State::Resuming;
                interconnect.set_state(current_state);

                let resumed = {
                    let sess =
                        session.as_mut().expect("a running driver always holds a session");
                    resume_session(&opts, &config, &interconnect, sess).await
                };
                let outcome = match resumed {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        debug!("explicit reconnect could not resume ({e}); starting fresh");
                        // Invariant 1: drop the stale session's secret key
                        // before publicly transitioning back to CONNECTING.
                        session = None;
                        current_state = State::Connecting;
                        interconnect.set_state(current_state);
                        match connect_initial(&opts, &config, &interconnect).await {
                            Ok(new_session) => {
                                session = Some(new_session);
                                Ok(())
                            },
                            Err(e) => Err(e),
                        }
                    },
                };

                match outcome {
                    Ok(()) => {
                        attempts = 0;
                        last_wait = None;
                        current_state = State::Connected;
                        interconnect.set_state(current_state);
                    },
                    Err(e) => {
                        warn!("explicit reconnect failed: {e}");
                        current_state = State::Disconnected;
                        interconnect.set_state(current_state);
                        break;
                    },
                }
            },
            CoreMessage::FullReconnect(new_opts) => {
                opts = *new_opts;
                // Invariant 1: drop the previous server's session (and its
                // secret key) before publicly transitioning back to
                // CONNECTING against the new endpoint.
                session = None;
                current_state = State::Connecting;
                interconnect.set_state(current_state);

                match connect_initial(&opts, &config, &interconnect).await {
                    Ok(new_session) => {
                        session = Some(new_session);
                        attempts = 0;
                        last_wait = None;
                        current_state = State::Connected;
                        interconnect.set_state(current_state);
                    },
                    Err(e) => {
                        warn!("reconnect after server migration failed: {e}");
                        current_state = State::Disconnected;
                        interconnect.set_state(current_state);
                        break;
                    },
                }
            },
            CoreMessage::Disconnect => {
                debug!("disconnect requested");
                current_state = State::Disconnected;
                interconnect.set_state(current_state);
                break;
            },
            CoreMessage::Speaking(is_speaking) => {
                // No live websocket task to forward to (e.g. mid-backoff) is
                // not an error; the next attempt starts silent.
                if let Some(sess) = session.as_ref() {
                    let _ = sess.ws_tx.send(tasks::message::WsMessage::Speaking(is_speaking));
                }
            },
        }
    }

    drop(session);
}

/// Performs a from-scratch `IDENTIFY` handshake, retrying per
/// `config.driver_retry` for errors [`Error::is_retryable`] deems worth
/// retrying. Used both for the very first connect and for any later full
/// rebuild (a non-resumable-but-retryable loss, or an explicit migration).
async fn connect_initial(
    opts: &VoiceServerOptions,
    config: &GatewayOptions,
    interconnect: &Interconnect,
) -> Result<Session> {
    let mut attempts = 0usize;
    let mut last_wait: Option<Duration> = None;

    loop {
        match establish_fresh(opts, config, interconnect).await {
            Ok(session) => return Ok(session),
            Err(e) if e.is_retryable() => {
                if let Some(limit) = config.driver_retry.retry_limit {
                    if attempts >= limit {
                        return Err(e);
                    }
                }
                attempts += 1;
                let wait = config.driver_retry.wait_before_retry(last_wait);
                last_wait = Some(wait);
                debug!("connect attempt {attempts} failed ({e}); retrying in {wait:?}");
                sleep(wait).await;
            },
            Err(e) => return Err(e),
        }
    }
}

/// Runs a complete `IDENTIFY` → IP discovery → `SESSION_DESCRIPTION`
/// handshake and spawns the websocket and media tasks it needs.
async fn establish_fresh(
    opts: &VoiceServerOptions,
    config: &GatewayOptions,
    interconnect: &Interconnect,
) -> Result<Session> {
    let handshake = connection::identify(opts, config, interconnect).await?;
    build_session(handshake, config, interconnect)
}

fn build_session(
    handshake: Handshake,
    config: &GatewayOptions,
    interconnect: &Interconnect,
) -> Result<Session> {
    let remote = handshake.udp.peer_addr()?;
    let udp = Arc::new(handshake.udp);
    let crypto_state = CryptoState::from(handshake.mode);

    let (send_task, receive_task) = spawn_media(
        &udp,
        remote,
        handshake.ssrc,
        &handshake.cipher,
        crypto_state,
        config,
        interconnect,
    );
    let (ws_tx, ws_handle) =
        spawn_ws_task(handshake.ws, handshake.ssrc, handshake.heartbeat_interval, interconnect);

    Ok(Session {
        ws_tx,
        udp,
        remote,
        ssrc: handshake.ssrc,
        cipher: Arc::new(handshake.cipher),
        crypto_state,
        session_description: handshake.session_description,
        resources: AttemptResources {
            ws_task: Some(ws_handle),
            send_task: Some(send_task),
            receive_task: Some(receive_task),
        },
    })
}

/// Performs a `RESUME` handshake against the existing UDP socket/cipher and
/// installs a fresh websocket task for it.
///
/// The previous websocket task has already torn itself down by the time this
/// is called (it reports `ConnectionLost` exactly once, then exits), so this
/// always spawns a brand new one over a brand new channel rather than
/// reusing the old `ws_tx`.
async fn resume_session(
    opts: &VoiceServerOptions,
    config: &GatewayOptions,
    interconnect: &Interconnect,
    session: &mut Session,
) -> Result<()> {
    let (ws, heartbeat_interval) = connection::resume(opts, config, interconnect).await?;
    let (ws_tx, ws_handle) = spawn_ws_task(ws, session.ssrc, heartbeat_interval, interconnect);

    session.ws_tx = ws_tx;
    session.resources.ws_task = Some(ws_handle);
    Ok(())
}

fn spawn_ws_task(
    ws: crate::ws::WsStream,
    ssrc: u32,
    heartbeat_interval: Duration,
    interconnect: &Interconnect,
) -> (flume::Sender<tasks::message::WsMessage>, JoinHandle<()>) {
    let (ws_tx, ws_rx) = flume::unbounded();
    let task = ws_task::WsTask::new(ws_rx, ws, ssrc, heartbeat_interval);
    let handle = tokio::spawn(ws_task::runner(interconnect.clone(), task));
    (ws_tx, handle)
}

fn spawn_media(
    socket: &Arc<UdpSocket>,
    remote: SocketAddr,
    ssrc: u32,
    cipher: &Cipher,
    crypto_state: CryptoState,
    config: &GatewayOptions,
    interconnect: &Interconnect,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let speaking = || audio::SpeakingSender(interconnect.core.clone());
    let send = config.send_task_factory.spawn(audio::MediaTransport {
        socket: Arc::clone(socket),
        remote,
        ssrc,
        cipher: cipher.clone(),
        crypto_state,
        speaking: speaking(),
    });
    let receive = config.receive_task_factory.spawn(audio::MediaTransport {
        socket: Arc::clone(socket),
        remote,
        ssrc,
        cipher: cipher.clone(),
        crypto_state,
        speaking: speaking(),
    });
    (send, receive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::crypto::CryptoMode;
    use crypto_secretbox::KeyInit;
    use std::sync::Weak;

    /// Property P5: once a `Session` (and the prior attempt's secret key with
    /// it) is dropped, nothing else in the driver can still reach that key.
    #[tokio::test]
    async fn dropping_the_session_drops_its_secret_key() {
        let udp = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let remote: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let (ws_tx, _ws_rx) = flume::unbounded();
        let cipher = Arc::new(Cipher::new_from_slice(&[7u8; 32]).unwrap());
        let weak: Weak<Cipher> = Arc::downgrade(&cipher);

        let session = Session {
            ws_tx,
            udp,
            remote,
            ssrc: 1,
            cipher,
            crypto_state: CryptoState::from(CryptoMode::Normal),
            session_description: SessionDescription {
                ssrc: 1,
                mode: CryptoMode::Normal.to_request_str().into(),
                secret_key: [7; 32],
            },
            resources: AttemptResources::empty(),
        };

        assert!(weak.upgrade().is_some(), "cipher reachable while session is alive");
        drop(session);
        assert!(weak.upgrade().is_none(), "cipher must be unreachable once the session is dropped");
    }
}
