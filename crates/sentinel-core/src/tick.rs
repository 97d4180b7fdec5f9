use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// Tick — Process-wide logical clock for memory uses
//
// Every recorded use of a storage region is stamped with a Tick. Hazard
// checks ("has this region been written since tick t?") are only meaningful
// if ticks follow the real order of memory effects, so there is exactly one
// counter for the whole process. Ticks start at 1; Tick(0) means "before
// anything was recorded".

static CLOCK: AtomicU64 = AtomicU64::new(0);

/// A logical timestamp. Totally ordered, strictly increasing per issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick(pub u64);

impl Tick {
    /// The tick that precedes every issued tick.
    pub const ZERO: Tick = Tick(0);

    /// Issue a fresh tick, greater than every tick issued before it.
    pub fn next() -> Tick {
        Tick(CLOCK.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// The most recently issued tick, without advancing the clock.
    pub fn current() -> Tick {
        Tick(CLOCK.load(Ordering::Acquire))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}
