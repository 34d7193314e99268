//! Reconnect policy: deciding whether a dropped connection should be retried
//! at all, and if so, whether to attempt a `RESUME` or a fresh `IDENTIFY`.

mod strategy;

pub use self::strategy::*;

use crate::driver::state::State;
use crate::model::CloseCode;

/// Configuration to be used for retrying driver connection attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Retry {
    /// Strategy used to determine how long to wait between retry attempts.
    ///
    /// *Defaults to an [`ExponentialBackoff`] from 0.25s
    /// to 10s, with a jitter of `0.1`.*
    ///
    /// [`ExponentialBackoff`]: Strategy::Backoff
    pub strategy: Strategy,
    /// The maximum number of retries to attempt.
    ///
    /// `None` will attempt an infinite number of retries,
    /// while `Some(0)` will attempt to connect *once* (no retries).
    ///
    /// *Defaults to `Some(5)`.*
    pub retry_limit: Option<usize>,
}

impl Default for Retry {
    fn default() -> Self {
        Self { strategy: Strategy::Backoff(Default::default()), retry_limit: Some(5) }
    }
}

impl Retry {
    /// Computes the wait before the next attempt, given how long the
    /// previous wait was (`None` on the very first retry).
    pub(crate) fn wait_before_retry(&self, last_wait: Option<std::time::Duration>) -> std::time::Duration {
        self.strategy.retry_in(last_wait)
    }
}

/// The outcome of classifying a connection loss against the reconnect policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    /// Give up: no further attempts should be made.
    Stop,
    /// Attempt another connection, transitioning to the given state first.
    Retry(State),
}

/// Classifies a connection loss and decides what should happen next.
///
/// This is a pure function of the observed close code, whether the session
/// had ever successfully connected before, and how many attempts have
/// already been made against `retry_limit`. It has no side effects and
/// performs no I/O, so it can be exercised directly in tests without a
/// running connection.
pub(crate) fn classify(
    close_code: Option<u16>,
    prior_connected: bool,
    attempts: usize,
    retry_limit: Option<usize>,
) -> Action {
    let resumable = match close_code {
        None => true,
        Some(raw) => match CloseCode::from_u16(raw) {
            Some(known) => {
                if !known.should_resume() {
                    return Action::Stop;
                }
                true
            },
            // Unrecognised codes are assumed transient, matching the stance
            // that a server speaking a newer protocol version shouldn't kill
            // a session this library doesn't yet understand.
            None => true,
        },
    };

    if let Some(limit) = retry_limit {
        if attempts >= limit {
            return Action::Stop;
        }
    }

    let next_state = if resumable && prior_connected { State::Resuming } else { State::Connecting };

    Action::Retry(next_state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_disconnect_never_retries() {
        // 4014: Disconnected.
        assert_eq!(classify(Some(4014), true, 0, Some(5)), Action::Stop);
    }

    #[test]
    fn auth_failure_never_retries() {
        // 4004: AuthenticationFailed.
        assert_eq!(classify(Some(4004), false, 0, None), Action::Stop);
    }

    #[test]
    fn voice_server_crash_resumes_when_previously_connected() {
        // 4015: VoiceServerCrash.
        assert_eq!(classify(Some(4015), true, 0, Some(5)), Action::Retry(State::Resuming));
    }

    #[test]
    fn voice_server_crash_before_first_connect_starts_fresh() {
        assert_eq!(classify(Some(4015), false, 0, Some(5)), Action::Retry(State::Connecting));
    }

    #[test]
    fn unknown_close_code_is_treated_as_transient() {
        assert_eq!(classify(Some(9999), true, 0, Some(5)), Action::Retry(State::Resuming));
    }

    #[test]
    fn network_drop_with_no_close_code_is_transient() {
        assert_eq!(classify(None, false, 0, Some(5)), Action::Retry(State::Connecting));
    }

    #[test]
    fn retry_limit_exhausted_stops_even_for_transient_codes() {
        assert_eq!(classify(Some(4015), true, 5, Some(5)), Action::Stop);
    }

    #[test]
    fn unlimited_retries_never_stop_on_attempt_count_alone() {
        assert_eq!(classify(Some(4015), true, 1_000_000, None), Action::Retry(State::Resuming));
    }
}
