//! Teardown of the background tasks spawned for one connected span.
//!
//! Resources are released in the reverse of the order they were acquired in
//! (receive task, then send task, then the websocket task) so that the media
//! tasks — which hold the only references into the UDP socket and cipher —
//! are always torn down before the control-plane task whose handshake
//! produced them.

use tokio::task::JoinHandle;
use tracing::trace;

/// The background tasks spawned for one connected span, torn down together.
///
/// A fresh instance is installed whenever the driver (re-)establishes a
/// from-scratch session; a `RESUME` leaves the existing instance alone, since
/// the media tasks and their UDP socket are not recreated across a resume.
pub(crate) struct AttemptResources {
    pub ws_task: Option<JoinHandle<()>>,
    pub send_task: Option<JoinHandle<()>>,
    pub receive_task: Option<JoinHandle<()>>,
}

impl AttemptResources {
    pub(crate) fn empty() -> Self {
        Self { ws_task: None, send_task: None, receive_task: None }
    }
}

impl Drop for AttemptResources {
    fn drop(&mut self) {
        if let Some(h) = self.receive_task.take() {
            h.abort();
            trace!("aborted receive task for connection attempt");
        }
        if let Some(h) = self.send_task.take() {
            h.abort();
            trace!("aborted send task for connection attempt");
        }
        if let Some(h) = self.ws_task.take() {
            h.abort();
            trace!("aborted websocket task for connection attempt");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_resources_drop_without_panicking() {
        let resources = AttemptResources::empty();
        drop(resources);
    }

    #[tokio::test]
    async fn dropping_resources_aborts_their_tasks() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        let resources =
            AttemptResources { ws_task: Some(handle), send_task: None, receive_task: None };
        let handle_ref = resources.ws_task.as_ref().unwrap().abort_handle();
        drop(resources);
        // Give the runtime a tick to observe the abort.
        tokio::task::yield_now().await;
        assert!(handle_ref.is_finished());
    }
}
