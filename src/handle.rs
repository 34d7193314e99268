//! The public surface: constructing a client, starting its background
//! driver, and interacting with a running session.

use crate::driver::config::{ChannelRetrieveTask, GatewayOptions};
use crate::driver::connection::error::{Error, Result};
use crate::driver::state::State;
use crate::driver::tasks::message::CoreMessage;
use crate::driver::tasks::Interconnect;
use crate::driver::{self};
use crate::events::GatewayEvent;
use crate::id::{ChannelId, GuildId};
use crate::info::VoiceServerOptions;
use flume::Sender;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::instrument;

/// Capacity of the broadcast channel backing [`ConnectionHandle::events`].
///
/// Subscribers that fall behind this many unread events silently drop the
/// oldest ones rather than stalling the driver loop.
const EVENT_BUFFER: usize = 128;

/// An unstarted gateway client: holds connection parameters and
/// configuration until [`start`](Self::start) spawns the background driver.
#[derive(Debug)]
pub struct GatewayClient {
    opts: VoiceServerOptions,
    config: GatewayOptions,
    started: AtomicBool,
}

impl GatewayClient {
    /// Builds a client for the given session, without connecting.
    pub fn new(opts: VoiceServerOptions, config: GatewayOptions) -> Self {
        Self { opts, config, started: AtomicBool::new(false) }
    }

    /// Spawns the background driver and performs the initial handshake,
    /// resolving once the first `SESSION_DESCRIPTION` is in hand (or the
    /// configured retry budget for the first connect is exhausted).
    ///
    /// Calling this a second time on the same client returns
    /// [`Error::AlreadyStarted`] without disturbing the existing connection.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<ConnectionHandle> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        let (core_tx, core_rx) = flume::unbounded();
        let (events_tx, _events_rx) = broadcast::channel(EVENT_BUFFER);
        let (state_tx, state_rx) = watch::channel(State::Connecting);
        let (connected_tx, connected_rx) = oneshot::channel();

        let interconnect =
            Interconnect { core: core_tx.clone(), events: events_tx.clone(), state: state_tx };

        driver::start(self.opts.clone(), self.config.clone(), interconnect, core_rx, connected_tx);

        connected_rx.await.map_err(|_| Error::AttemptDiscarded)??;

        Ok(ConnectionHandle {
            core: core_tx,
            events: events_tx,
            state: state_rx,
            guild_id: self.opts.guild_id,
            channel_retrieve_task: self.config.channel_retrieve_task.clone(),
        })
    }
}

/// A running gateway session: the handle returned by
/// [`GatewayClient::start`].
///
/// Cloning shares the same underlying driver; every clone observes the same
/// events and can equally request a reconnect or disconnect.
#[derive(Clone)]
pub struct ConnectionHandle {
    core: Sender<CoreMessage>,
    events: broadcast::Sender<GatewayEvent>,
    state: watch::Receiver<State>,
    guild_id: GuildId,
    channel_retrieve_task: Arc<dyn ChannelRetrieveTask>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle").field("guild_id", &self.guild_id).finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    /// Subscribes to the stream of observable gateway events.
    ///
    /// Lossy: a subscriber that falls behind silently misses the oldest
    /// events it hasn't yet read, rather than stalling the driver.
    pub fn events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// Subscribes to the session's lifecycle state.
    ///
    /// Unlike [`events`](Self::events), a fresh subscriber immediately sees
    /// the current state rather than only future transitions.
    pub fn state_events(&self) -> watch::Receiver<State> {
        self.state.clone()
    }

    /// The guild this session belongs to.
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Resolves the voice channel this session currently belongs to, via the
    /// [`ChannelRetrieveTask`] supplied in this client's [`GatewayOptions`].
    pub async fn channel_id(&self) -> Option<ChannelId> {
        self.channel_retrieve_task.channel_id(self.guild_id).await
    }

    /// Requests a reconnect: a `RESUME` if the session has connected before,
    /// falling back to a fresh `IDENTIFY` if that's refused.
    ///
    /// Only valid while the session is [`State::Connected`]; returns
    /// [`Error::NotConnected`] otherwise. Resolves once the driver has
    /// publicly reached `Connected` again, or errors if it instead settles on
    /// `Disconnected` or the driver stops mid-attempt.
    #[instrument(skip(self))]
    pub async fn reconnect(&self) -> Result<()> {
        if *self.state.borrow() != State::Connected {
            return Err(Error::NotConnected);
        }

        let mut state = self.state_events();
        self.core.send(CoreMessage::Reconnect).map_err(|_| Error::NotConnected)?;

        loop {
            state.changed().await.map_err(|_| Error::NotConnected)?;
            match *state.borrow() {
                State::Connected => return Ok(()),
                State::Disconnected => return Err(Error::NotConnected),
                State::Connecting | State::Resuming => continue,
            }
        }
    }

    /// Migrates this session to a new voice server: discards the current UDP
    /// transport and media tasks and performs a fresh handshake against
    /// `opts`.
    ///
    /// Returns [`Error::NotConnected`] if the driver has already stopped.
    pub fn migrate(&self, opts: VoiceServerOptions) -> Result<()> {
        self.core.send(CoreMessage::FullReconnect(Box::new(opts))).map_err(|_| Error::NotConnected)
    }

    /// Tears the connection down and stops the driver. No further reconnects
    /// will be attempted.
    ///
    /// Returns [`Error::NotConnected`] if the driver has already stopped.
    pub fn disconnect(&self) -> Result<()> {
        self.core.send(CoreMessage::Disconnect).map_err(|_| Error::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::audio::{NoopReceiveTaskFactory, NoopSendTaskFactory};
    use crate::id::UserId;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_opts() -> VoiceServerOptions {
        VoiceServerOptions {
            guild_id: GuildId(1),
            channel_id: ChannelId(2),
            user_id: UserId(3),
            session_id: "sesh".into(),
            token: "token".into(),
            endpoint: "voice.example.invalid:443".into(),
        }
    }

    #[tokio::test]
    async fn starting_twice_returns_already_started() {
        let config = GatewayOptions::default()
            .driver_timeout(Some(Duration::from_millis(50)))
            .driver_retry(crate::driver::retry::Retry { retry_limit: Some(0), ..Default::default() })
            .send_task_factory(Arc::new(NoopSendTaskFactory))
            .receive_task_factory(Arc::new(NoopReceiveTaskFactory));

        let client = GatewayClient::new(test_opts(), config);

        // The very first connect will fail fast (nothing is listening at the
        // bogus endpoint) and isn't retried, so this resolves quickly.
        let first = client.start().await;
        assert!(first.is_err());

        let second = client.start().await;
        assert!(matches!(second, Err(Error::AlreadyStarted)));
    }
}
