//! Tape kinematics.
//!
//! A transport is stopped, ramping up, running at speed, or ramping down, in
//! one of two directions. Position is in lines and is recomputed from elapsed
//! ticks using the closed-form ramp equations; nothing here touches the
//! controller.
use derive_more::IsVariant;
use thiserror::Error;

use super::geometry::Geometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn from_reverse(reverse: bool) -> Self {
        if reverse { Direction::Reverse } else { Direction::Forward }
    }
}

// What the transfer engine does once the unit is at speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
pub enum Operation {
    Search,
    Read,
    Write,
    ReadAll,
    WriteAll,
    // Run off the end of the reel without reporting anything.
    OffReel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IsVariant)]
pub enum Regime {
    #[default]
    Stopped,
    Accelerating(Direction),
    AtSpeed(Direction, Operation),
    Decelerating(Direction),
}

impl Regime {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Regime::Stopped => None,
            Regime::Accelerating(dir) | Regime::AtSpeed(dir, _) | Regime::Decelerating(dir) => {
                Some(dir)
            }
        }
    }

    // Accelerating or at speed: the drive is being asked to move.
    pub fn is_driven(self) -> bool {
        matches!(self, Regime::Accelerating(_) | Regime::AtSpeed(..))
    }
}

// A deferred state, applied when the current ramp finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Accelerate(Direction),
    Run(Direction, Operation),
}

impl Phase {
    pub fn regime(self) -> Regime {
        match self {
            Phase::Accelerate(dir) => Regime::Accelerating(dir),
            Phase::Run(dir, op) => Regime::AtSpeed(dir, op),
        }
    }
}

/// Up to two deferred phases, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pending {
    next: Option<Phase>,
    after: Option<Phase>,
}

impl Pending {
    pub fn none() -> Self {
        Pending::default()
    }

    pub fn one(phase: Phase) -> Self {
        Pending { next: Some(phase), after: None }
    }

    pub fn two(first: Phase, second: Phase) -> Self {
        Pending { next: Some(first), after: Some(second) }
    }

    pub fn pop(&mut self) -> Option<Phase> {
        let next = self.next.take();
        self.next = self.after.take();
        next
    }

    pub fn peek(&self) -> Option<Phase> {
        self.next
    }

    pub fn len(&self) -> usize {
        self.next.is_some() as usize + self.after.is_some() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("tape ran off the reel (line {position})")]
pub struct OffTape {
    pub position: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Ticks per line at speed.
    pub line_time: u64,
    /// Ticks to come to a stop from full speed.
    pub decel_time: u64,
}

impl Timing {
    // Starting takes 3/4 of the time stopping does. Calibration value carried
    // over from measured drives, not derived from anything.
    pub const ACCEL_NUMERATOR: u64 = 3;
    pub const ACCEL_DENOMINATOR: u64 = 4;

    pub fn accel_time(&self) -> u64 {
        self.decel_time - self.decel_time / Self::ACCEL_DENOMINATOR * (Self::ACCEL_DENOMINATOR - Self::ACCEL_NUMERATOR)
    }

    pub fn lines_to_ticks(&self, lines: u64) -> u64 {
        lines * self.line_time
    }

    /// Lines covered in `elapsed` ticks under `regime`, measured from the
    /// start of the current ramp or run.
    pub fn lines_moved(&self, regime: Regime, elapsed: u64) -> u64 {
        let u = elapsed / self.line_time;
        match regime {
            Regime::Stopped => 0,
            Regime::Decelerating(_) => {
                let v = (self.decel_time / self.line_time).max(1);
                let u = u.min(v);
                (2 * u * v - u * u) / (2 * v)
            }
            Regime::Accelerating(_) => {
                let v = (self.accel_time() / self.line_time).max(1);
                let u = u.min(v);
                (u * u) / (2 * v)
            }
            Regime::AtSpeed(..) => u,
        }
    }
}

/// New position after `elapsed` ticks. Leaving the physical reel is an error;
/// the caller decides what happens to the unit.
pub fn advance_position(
    position: u32,
    regime: Regime,
    elapsed: u64,
    timing: &Timing,
    geometry: &Geometry,
) -> Result<u32, OffTape> {
    let delta = timing.lines_moved(regime, elapsed) as i64;
    let new = match regime.direction() {
        Some(Direction::Reverse) => position as i64 - delta,
        _ => position as i64 + delta,
    };
    if new < 0 || new > geometry.last_line() as i64 {
        return Err(OffTape { position: new });
    }
    Ok(new as u32)
}

/// How a newly issued function gets the unit to speed in the right direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Start accelerating now; run the function once at speed.
    Accelerate(Pending),
    /// Stop first, then accelerate the other way, then run.
    Reverse(Pending),
    /// Already accelerating the right way; replace what happens at speed.
    Defer(Pending),
    /// Already at speed the right way.
    Execute(Phase),
}

pub fn plan_start(regime: Regime, dir: Direction, op: Operation) -> Plan {
    let run = Phase::Run(dir, op);
    match regime {
        Regime::Stopped => Plan::Accelerate(Pending::one(run)),
        _ if regime.direction() != Some(dir) => {
            Plan::Reverse(Pending::two(Phase::Accelerate(dir), run))
        }
        Regime::Decelerating(_) => Plan::Accelerate(Pending::one(run)),
        Regime::Accelerating(_) => Plan::Defer(Pending::one(run)),
        Regime::AtSpeed(..) => Plan::Execute(run),
    }
}
