//! Background tasks spawned by a running gateway connection, and the
//! channels used to talk to them.

pub(crate) mod disposal;
pub(crate) mod message;
pub(crate) mod ws_task;

use crate::driver::state::State;
use crate::events::GatewayEvent;
use flume::Sender;
use message::CoreMessage;
use tokio::sync::{broadcast, watch};

/// Shared channel endpoints used to communicate between the driver loop,
/// its background websocket task, and external subscribers.
#[derive(Clone)]
pub(crate) struct Interconnect {
    /// Background tasks report connection problems back to the driver loop
    /// on this channel.
    pub core: Sender<CoreMessage>,
    /// Fan-out of observable events to external subscribers. Overflowing
    /// subscribers silently drop the oldest events they haven't yet read.
    pub events: broadcast::Sender<GatewayEvent>,
    /// Latest-value-only broadcast of the session's lifecycle state.
    pub state: watch::Sender<State>,
}

impl Interconnect {
    pub(crate) fn fire(&self, event: GatewayEvent) {
        // No active subscribers is not an error.
        let _ = self.events.send(event);
    }

    pub(crate) fn set_state(&self, state: State) {
        let _ = self.state.send(state);
        self.fire(GatewayEvent::StateChanged(state));
    }
}
