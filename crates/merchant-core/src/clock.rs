//! Round clock for the merchant game.
//!
//! The clock maps wall-clock time onto the discrete round sequence. It holds
//! no mutable state: the current round and the time left in it are pure
//! functions of the configured starting time, the round duration and `now`.
//!
//! # Design Principles
//!
//! - All derivations use checked arithmetic (no silent overflow).
//! - Nothing advances the round. It is recomputed on every read.
//! - Once the last round has fully elapsed the game freezes on it forever.
//!   The clock never ends the game by itself.

use chrono::{DateTime, Utc};
use serde::Serialize;

use merchant_types::GameData;

/// Seconds in one minute of `round_duration`.
const SECONDS_PER_MINUTE: i64 = 60;

/// Errors that can occur when building a clock.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// Invalid timing configuration (e.g. zero-length rounds).
    #[error("invalid clock configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// The round state at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundStatus {
    /// The current round (1-based).
    pub round: u32,
    /// Seconds left in the current round; zero once frozen.
    pub seconds_remaining: i64,
    /// The last round of the game.
    pub last_round: u32,
    /// Whether the last round has fully elapsed.
    pub frozen: bool,
}

/// Round clock derived from [`GameData`] and the number of rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundClock {
    /// Start of round 1.
    starting_time: DateTime<Utc>,
    /// Length of one round in seconds.
    round_seconds: i64,
    /// Highest round number.
    last_round: u32,
}

impl RoundClock {
    /// Create a clock from game data and the highest round number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the round duration or the
    /// number of rounds is zero.
    pub fn new(game: &GameData, last_round: u32) -> Result<Self, ClockError> {
        Self::from_parts(game.starting_time, game.round_duration, last_round)
    }

    /// Create a clock from explicit parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if `round_duration_minutes` or
    /// `last_round` is zero.
    pub fn from_parts(
        starting_time: DateTime<Utc>,
        round_duration_minutes: u32,
        last_round: u32,
    ) -> Result<Self, ClockError> {
        if round_duration_minutes == 0 {
            return Err(ClockError::InvalidConfig {
                reason: "round_duration must be at least 1 minute".to_owned(),
            });
        }
        if last_round == 0 {
            return Err(ClockError::InvalidConfig {
                reason: "at least one round must exist".to_owned(),
            });
        }
        let round_seconds = i64::from(round_duration_minutes)
            .checked_mul(SECONDS_PER_MINUTE)
            .ok_or_else(|| ClockError::InvalidConfig {
                reason: "round_duration overflows".to_owned(),
            })?;
        Ok(Self {
            starting_time,
            round_seconds,
            last_round,
        })
    }

    /// Start of round 1.
    pub const fn starting_time(&self) -> DateTime<Utc> {
        self.starting_time
    }

    /// The highest round number.
    pub const fn last_round(&self) -> u32 {
        self.last_round
    }

    /// Length of one round in seconds.
    pub const fn round_seconds(&self) -> i64 {
        self.round_seconds
    }

    /// Whole seconds since round 1 started, clamped at zero.
    fn elapsed(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.starting_time)
            .num_seconds()
            .max(0)
    }

    /// Whether the last round has fully elapsed at `now`.
    pub fn is_frozen(&self, now: DateTime<Utc>) -> bool {
        i64::from(self.last_round)
            .checked_mul(self.round_seconds)
            .is_some_and(|end| self.elapsed(now) >= end)
    }

    /// The round in progress at `now`.
    ///
    /// Before the starting time this is round 1; after the last round it
    /// stays on the last round.
    pub fn current_round(&self, now: DateTime<Utc>) -> u32 {
        let index = self
            .elapsed(now)
            .checked_div(self.round_seconds)
            .unwrap_or(0);
        let round = u32::try_from(index)
            .ok()
            .and_then(|i| i.checked_add(1))
            .unwrap_or(self.last_round);
        round.min(self.last_round)
    }

    /// Seconds left in the round in progress at `now`; zero once frozen.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        if self.is_frozen(now) {
            return 0;
        }
        let into_round = self
            .elapsed(now)
            .checked_rem(self.round_seconds)
            .unwrap_or(0);
        self.round_seconds.saturating_sub(into_round)
    }

    /// The full round state at `now`.
    pub fn status(&self, now: DateTime<Utc>) -> RoundStatus {
        RoundStatus {
            round: self.current_round(now),
            seconds_remaining: self.remaining_seconds(now),
            last_round: self.last_round,
            frozen: self.is_frozen(now),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap()
    }

    fn clock() -> RoundClock {
        RoundClock::from_parts(start(), 15, 6).unwrap()
    }

    #[test]
    fn zero_duration_is_rejected() {
        assert!(RoundClock::from_parts(start(), 0, 6).is_err());
    }

    #[test]
    fn zero_rounds_is_rejected() {
        assert!(RoundClock::from_parts(start(), 15, 0).is_err());
    }

    #[test]
    fn fourteen_minutes_in_is_round_one() {
        let now = start() + Duration::minutes(14);
        assert_eq!(clock().current_round(now), 1);
        assert_eq!(clock().remaining_seconds(now), 60);
    }

    #[test]
    fn sixteen_minutes_in_is_round_two() {
        let now = start() + Duration::minutes(16);
        assert_eq!(clock().current_round(now), 2);
        assert_eq!(clock().remaining_seconds(now), 14 * 60);
    }

    #[test]
    fn far_future_freezes_on_last_round() {
        let now = start() + Duration::hours(100);
        let status = clock().status(now);
        assert_eq!(status.round, 6);
        assert_eq!(status.seconds_remaining, 0);
        assert!(status.frozen);
    }

    #[test]
    fn round_boundary_starts_next_round() {
        let now = start() + Duration::minutes(15);
        assert_eq!(clock().current_round(now), 2);
        assert_eq!(clock().remaining_seconds(now), 900);
    }

    #[test]
    fn last_round_counts_down_until_it_elapses() {
        let now = start() + Duration::minutes(80);
        let status = clock().status(now);
        assert_eq!(status.round, 6);
        assert_eq!(status.seconds_remaining, 600);
        assert!(!status.frozen);

        let end = start() + Duration::minutes(90);
        assert_eq!(clock().remaining_seconds(end), 0);
        assert!(clock().is_frozen(end));
    }

    #[test]
    fn before_start_clamps_to_round_one() {
        let now = start() - Duration::minutes(30);
        assert_eq!(clock().current_round(now), 1);
        assert_eq!(clock().remaining_seconds(now), 900);
    }

    #[test]
    fn clock_from_game_data() {
        let game = GameData {
            starting_time: start(),
            round_duration: 10,
            starting_loan: 500,
            loan_increase: 100,
            loan_interest: 10,
        };
        let c = RoundClock::new(&game, 3).unwrap();
        assert_eq!(c.round_seconds(), 600);
        assert_eq!(c.current_round(start() + Duration::minutes(25)), 3);
        assert_eq!(c.last_round(), 3);
    }
}
