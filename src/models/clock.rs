use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::piece::Color;

/// One side's countdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Clock {
    pub remaining_ms: u64,
    pub active: bool,
}

/// Both players' clocks plus the time-control settings they run under.
///
/// Invariant: exactly one side is active while its session is active,
/// neither side otherwise. All mutation goes through `start`, `halt`,
/// `tick` and `commit_move`; elapsed time is always charged against
/// `last_transition` so a background tick and a move commit never
/// double-count the same wall-clock span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockPair {
    pub default_ms: u64,
    pub increment_ms: u64,
    /// When false, crediting an increment never pushes a clock past
    /// `default_ms`.
    pub bank_increment: bool,
    pub white: Clock,
    pub black: Clock,
    pub last_transition: Option<DateTime<Utc>>,
}

impl ClockPair {
    pub fn new(default_ms: u64, increment_ms: u64, bank_increment: bool) -> Self {
        let idle = Clock {
            remaining_ms: default_ms,
            active: false,
        };
        Self {
            default_ms,
            increment_ms,
            bank_increment,
            white: idle,
            black: idle,
            last_transition: None,
        }
    }

    pub fn side(&self, color: Color) -> &Clock {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn side_mut(&mut self, color: Color) -> &mut Clock {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    pub fn active_side(&self) -> Option<Color> {
        if self.white.active {
            Some(Color::White)
        } else if self.black.active {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// Activate one side's countdown (game start or resume from pause).
    pub fn start(&mut self, color: Color, now: DateTime<Utc>) {
        self.white.active = color == Color::White;
        self.black.active = color == Color::Black;
        self.last_transition = Some(now);
    }

    /// Deactivate both sides (pause or game over).
    pub fn halt(&mut self) {
        self.white.active = false;
        self.black.active = false;
        self.last_transition = None;
    }

    fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        match self.last_transition {
            Some(since) => (now - since).num_milliseconds().max(0) as u64,
            None => 0,
        }
    }

    /// Charge elapsed time to the active side. Returns the side that just
    /// ran out, if any; reaching zero while active is the timeout signal.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Color> {
        let active = self.active_side()?;
        let elapsed = self.elapsed_ms(now);
        self.last_transition = Some(now);
        let clock = self.side_mut(active);
        clock.remaining_ms = clock.remaining_ms.saturating_sub(elapsed);
        if clock.remaining_ms == 0 {
            Some(active)
        } else {
            None
        }
    }

    /// Commit a move by `mover`: charge their elapsed time, credit their
    /// increment, and hand the countdown to the other side.
    pub fn commit_move(&mut self, mover: Color, now: DateTime<Utc>) {
        let elapsed = self.elapsed_ms(now);
        let increment = self.increment_ms;
        let cap = if self.bank_increment {
            u64::MAX
        } else {
            self.default_ms
        };
        let clock = self.side_mut(mover);
        clock.remaining_ms = clock.remaining_ms.saturating_sub(elapsed);
        clock.remaining_ms = (clock.remaining_ms + increment).min(cap);
        clock.active = false;
        let other = self.side_mut(mover.opposite());
        other.active = true;
        self.last_transition = Some(now);
    }
}
