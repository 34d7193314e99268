//! The heartbeat ticker: a re-armable deadline that fires on its own interval
//! without spawning a fresh task per beat, and tracks the nonce of the last
//! heartbeat sent so acks can be matched up.

use rand::random;
use std::time::Duration;
use tokio::time::{sleep_until, Instant, Sleep};

/// Tracks when the next heartbeat is due and the nonce awaiting acknowledgement.
///
/// Call [`HeartbeatTicker::deadline`] inside a `tokio::select!` arm; on fire,
/// call [`HeartbeatTicker::beat`] to get the nonce to send and re-arm the timer.
pub(crate) struct HeartbeatTicker {
    interval: Duration,
    next: Instant,
    last_nonce: Option<u64>,
}

impl HeartbeatTicker {
    pub(crate) fn new(interval: Duration) -> Self {
        Self { interval, next: Instant::now() + interval, last_nonce: None }
    }

    /// A future that resolves when the next heartbeat is due. Intended to be
    /// re-created each loop iteration, mirroring `tokio::time::sleep_until`'s
    /// single-shot contract.
    pub(crate) fn deadline(&self) -> Sleep {
        sleep_until(self.next)
    }

    /// Re-arms the ticker for `interval` from now, discarding the old deadline.
    pub(crate) fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
        self.next = Instant::now() + self.interval;
    }

    /// Generates a new heartbeat nonce, remembers it, and re-arms the ticker.
    pub(crate) fn beat(&mut self) -> u64 {
        let nonce = random::<u64>();
        self.last_nonce = Some(nonce);
        self.next = Instant::now() + self.interval;
        nonce
    }

    /// Consumes the outstanding nonce (if any), reporting whether `ack_nonce`
    /// matches what this ticker last sent.
    pub(crate) fn acknowledge(&mut self, ack_nonce: u64) -> HeartbeatAckResult {
        match self.last_nonce.take() {
            Some(nonce) if nonce == ack_nonce => HeartbeatAckResult::Matched,
            Some(nonce) => HeartbeatAckResult::Mismatched { expected: nonce },
            None => HeartbeatAckResult::Unsolicited,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum HeartbeatAckResult {
    Matched,
    Mismatched { expected: u64 },
    Unsolicited,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledge_matches_last_beat() {
        let mut ticker = HeartbeatTicker::new(Duration::from_secs(10));
        let nonce = ticker.beat();
        assert_eq!(ticker.acknowledge(nonce), HeartbeatAckResult::Matched);
    }

    #[test]
    fn acknowledge_detects_mismatch() {
        let mut ticker = HeartbeatTicker::new(Duration::from_secs(10));
        let nonce = ticker.beat();
        assert_eq!(
            ticker.acknowledge(nonce.wrapping_add(1)),
            HeartbeatAckResult::Mismatched { expected: nonce }
        );
    }

    #[test]
    fn acknowledge_without_a_prior_beat_is_unsolicited() {
        let mut ticker = HeartbeatTicker::new(Duration::from_secs(10));
        assert_eq!(ticker.acknowledge(1), HeartbeatAckResult::Unsolicited);
    }

    #[test]
    fn a_second_beat_consumes_the_first_nonce() {
        let mut ticker = HeartbeatTicker::new(Duration::from_secs(10));
        let first = ticker.beat();
        let second = ticker.beat();
        assert_ne!(first, second, "nonces should vary beat-to-beat with overwhelming probability");
        assert_eq!(ticker.acknowledge(second), HeartbeatAckResult::Matched);
    }
}
