//! Tunable options governing a gateway connection: crypto mode, timeouts,
//! retry policy, and the hooks used to wire up audio send/receive tasks.

use crate::driver::audio::{NoopReceiveTaskFactory, NoopSendTaskFactory, ReceiveTaskFactory, SendTaskFactory};
use crate::driver::crypto::CryptoMode;
use crate::driver::retry::Retry;
use crate::id::{ChannelId, GuildId};
use async_trait::async_trait;
use derivative::Derivative;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Looks up the voice channel a guild's session currently belongs to.
///
/// Injected so the core never has to know about the host's guild/channel
/// membership model directly; see [`ConnectionHandle::channel_id`]
/// (crate::handle::ConnectionHandle::channel_id).
#[async_trait]
pub trait ChannelRetrieveTask: Debug + Send + Sync {
    async fn channel_id(&self, guild_id: GuildId) -> Option<ChannelId>;
}

/// Default [`ChannelRetrieveTask`]: hosts that don't track channel membership
/// externally get `None` back rather than a dangling lookup.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopChannelRetrieveTask;

#[async_trait]
impl ChannelRetrieveTask for NoopChannelRetrieveTask {
    async fn channel_id(&self, _guild_id: GuildId) -> Option<ChannelId> {
        None
    }
}

/// Configuration for a [`GatewayClient`](crate::handle::GatewayClient).
#[derive(Clone, Derivative)]
#[derivative(Debug)]
#[non_exhaustive]
pub struct GatewayOptions {
    /// Selected tagging mode for voice packet encryption.
    ///
    /// Defaults to [`CryptoMode::Normal`]. Changing this on a live connection
    /// only applies to the next session, not the current one.
    pub crypto_mode: CryptoMode,

    /// Connection retry logic used by the driver loop.
    pub driver_retry: Retry,

    /// Maximum amount of time to wait for an attempted connection (including
    /// the websocket handshake and IP discovery) before abandoning it.
    ///
    /// Defaults to 10 seconds. `None` never times out.
    pub driver_timeout: Option<Duration>,

    /// Per-attempt timeout for an IP discovery round trip.
    pub ip_discovery_timeout: Duration,

    /// Number of additional IP discovery attempts after the first, before
    /// the handshake fails with a retryable error.
    pub ip_discovery_retries: usize,

    /// Factory used to construct the task that sends encoded media out over
    /// the UDP socket this driver negotiates.
    ///
    /// Audio encoding/mixing is outside this library's scope; the default
    /// factory produces a task that sends nothing.
    #[derivative(Debug = "ignore")]
    pub send_task_factory: Arc<dyn SendTaskFactory>,

    /// Factory used to construct the task that receives media from the UDP
    /// socket this driver negotiates.
    #[derivative(Debug = "ignore")]
    pub receive_task_factory: Arc<dyn ReceiveTaskFactory>,

    /// Host callback used to answer [`ConnectionHandle::channel_id`]
    /// (crate::handle::ConnectionHandle::channel_id) queries.
    #[derivative(Debug = "ignore")]
    pub channel_retrieve_task: Arc<dyn ChannelRetrieveTask>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            crypto_mode: CryptoMode::Normal,
            driver_retry: Retry::default(),
            driver_timeout: Some(Duration::from_secs(10)),
            ip_discovery_timeout: Duration::from_secs(5),
            ip_discovery_retries: 5,
            send_task_factory: Arc::new(NoopSendTaskFactory),
            receive_task_factory: Arc::new(NoopReceiveTaskFactory),
            channel_retrieve_task: Arc::new(NoopChannelRetrieveTask),
        }
    }
}

impl GatewayOptions {
    /// Sets this config's chosen cryptographic tagging scheme.
    #[must_use]
    pub fn crypto_mode(mut self, crypto_mode: CryptoMode) -> Self {
        self.crypto_mode = crypto_mode;
        self
    }

    /// Sets this config's timeout for establishing a connection.
    #[must_use]
    pub fn driver_timeout(mut self, driver_timeout: Option<Duration>) -> Self {
        self.driver_timeout = driver_timeout;
        self
    }

    /// Sets this config's connection retry configuration.
    #[must_use]
    pub fn driver_retry(mut self, driver_retry: Retry) -> Self {
        self.driver_retry = driver_retry;
        self
    }

    /// Sets the factory used to build the outbound media task.
    #[must_use]
    pub fn send_task_factory(mut self, factory: Arc<dyn SendTaskFactory>) -> Self {
        self.send_task_factory = factory;
        self
    }

    /// Sets the factory used to build the inbound media task.
    #[must_use]
    pub fn receive_task_factory(mut self, factory: Arc<dyn ReceiveTaskFactory>) -> Self {
        self.receive_task_factory = factory;
        self
    }

    /// Sets the callback used to resolve `channel_id()` queries.
    #[must_use]
    pub fn channel_retrieve_task(mut self, task: Arc<dyn ChannelRetrieveTask>) -> Self {
        self.channel_retrieve_task = task;
        self
    }

    /// Used to prevent changes that would invalidate the current session:
    /// the crypto mode can't change on a connection that's already live.
    pub(crate) fn make_safe(&mut self, previous: &GatewayOptions, connected: bool) {
        if connected {
            self.crypto_mode = previous.crypto_mode;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_safe_pins_crypto_mode_on_a_live_connection() {
        let previous = GatewayOptions::default().crypto_mode(CryptoMode::Suffix);
        let mut next = GatewayOptions::default().crypto_mode(CryptoMode::Lite);

        next.make_safe(&previous, true);
        assert_eq!(next.crypto_mode, CryptoMode::Suffix);
    }

    #[test]
    fn make_safe_leaves_changes_alone_when_not_connected() {
        let previous = GatewayOptions::default().crypto_mode(CryptoMode::Suffix);
        let mut next = GatewayOptions::default().crypto_mode(CryptoMode::Lite);

        next.make_safe(&previous, false);
        assert_eq!(next.crypto_mode, CryptoMode::Lite);
    }
}
