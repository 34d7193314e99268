//! Injection points for the media tasks this library doesn't implement
//! itself: encoding/mixing outbound audio and decoding/dispatching inbound
//! audio are out of scope, but the driver still needs *something* reading
//! and writing the UDP socket it negotiates.
//!
//! Callers that want actual audio supply their own [`SendTaskFactory`]/
//! [`ReceiveTaskFactory`]; the defaults wire up tasks that do nothing.

use crate::driver::crypto::CryptoState;
use crate::driver::tasks::message::CoreMessage;
use crypto_secretbox::XSalsa20Poly1305 as Cipher;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Lets an injected send task announce a speaking-state change.
///
/// Requests are routed through the driver loop rather than straight to the
/// live websocket task, since the latter is torn down and rebuilt across a
/// resume while this handle (and the send task holding it) lives on for the
/// whole attempt.
#[derive(Clone, Debug)]
pub struct SpeakingSender(pub(crate) flume::Sender<CoreMessage>);

impl SpeakingSender {
    /// Requests the gateway be told this session has started or stopped
    /// sending audio.
    ///
    /// A no-op if the driver has already stopped; speaking state is best
    /// effort and never worth failing a send task over.
    pub fn set_speaking(&self, speaking: bool) {
        let _ = self.0.send(CoreMessage::Speaking(speaking));
    }
}

/// Everything a media task needs to talk to the negotiated UDP transport.
///
/// The socket is shared (not split) between the send and receive tasks: one
/// writes, the other reads, and `UdpSocket`'s `send`/`recv` take `&self`, so
/// an `Arc` is all the mutual exclusion this needs.
pub struct MediaTransport {
    pub socket: Arc<UdpSocket>,
    pub remote: SocketAddr,
    pub ssrc: u32,
    pub cipher: Cipher,
    pub crypto_state: CryptoState,
    /// Only meaningful to a [`SendTaskFactory`]; a receive task has nothing
    /// to announce.
    pub speaking: SpeakingSender,
}

/// Constructs the task responsible for sending outbound media.
pub trait SendTaskFactory: Debug + Send + Sync {
    fn spawn(&self, transport: MediaTransport) -> JoinHandle<()>;
}

/// Constructs the task responsible for receiving inbound media.
pub trait ReceiveTaskFactory: Debug + Send + Sync {
    fn spawn(&self, transport: MediaTransport) -> JoinHandle<()>;
}

/// Default [`SendTaskFactory`]: spawns a task that immediately exits.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSendTaskFactory;

impl SendTaskFactory for NoopSendTaskFactory {
    fn spawn(&self, transport: MediaTransport) -> JoinHandle<()> {
        tokio::spawn(async move {
            drop(transport);
        })
    }
}

/// Default [`ReceiveTaskFactory`]: spawns a task that immediately exits.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReceiveTaskFactory;

impl ReceiveTaskFactory for NoopReceiveTaskFactory {
    fn spawn(&self, transport: MediaTransport) -> JoinHandle<()> {
        tokio::spawn(async move {
            drop(transport);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_send_factory_task_exits_promptly() {
        let (udp, remote) = loopback_pair().await;
        let handle = NoopSendTaskFactory.spawn(MediaTransport {
            socket: udp,
            remote,
            ssrc: 1,
            cipher: test_cipher(),
            crypto_state: CryptoState::Normal,
            speaking: test_speaking_sender(),
        });
        handle.await.expect("noop send task should not panic");
    }

    #[tokio::test]
    async fn noop_receive_factory_task_exits_promptly() {
        let (udp, remote) = loopback_pair().await;
        let handle = NoopReceiveTaskFactory.spawn(MediaTransport {
            socket: udp,
            remote,
            ssrc: 1,
            cipher: test_cipher(),
            crypto_state: CryptoState::Normal,
            speaking: test_speaking_sender(),
        });
        handle.await.expect("noop receive task should not panic");
    }

    #[test]
    fn set_speaking_is_a_noop_once_the_driver_is_gone() {
        let (tx, rx) = flume::unbounded();
        drop(rx);
        SpeakingSender(tx).set_speaking(true);
    }

    async fn loopback_pair() -> (Arc<UdpSocket>, SocketAddr) {
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let remote = udp.local_addr().unwrap();
        (Arc::new(udp), remote)
    }

    fn test_cipher() -> Cipher {
        use crypto_secretbox::KeyInit;
        Cipher::new_from_slice(&[0u8; 32]).unwrap()
    }

    fn test_speaking_sender() -> SpeakingSender {
        SpeakingSender(flume::unbounded().0)
    }
}
