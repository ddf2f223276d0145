use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::error::ClockError;

pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Converts a refresh rate in millihertz to a period in nanoseconds.
///
/// Returns `None` for a zero rate.
#[inline]
pub const fn millihz_to_nsec(millihz: u32) -> Option<u64> {
    if millihz == 0 {
        return None;
    }
    Some(1_000_000_000_000 / millihz as u64)
}

// ── ClockId ───────────────────────────────────────────────────────────────

/// POSIX clock identifier as carried on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ClockId(pub u32);

impl ClockId {
    pub const REALTIME: ClockId = ClockId(0);
    pub const MONOTONIC: ClockId = ClockId(1);
    pub const PROCESS_CPUTIME: ClockId = ClockId(2);
    pub const THREAD_CPUTIME: ClockId = ClockId(3);
    pub const MONOTONIC_RAW: ClockId = ClockId(4);
    pub const REALTIME_COARSE: ClockId = ClockId(5);
    pub const MONOTONIC_COARSE: ClockId = ClockId(6);
    pub const BOOTTIME: ClockId = ClockId(7);
    pub const REALTIME_ALARM: ClockId = ClockId(8);
    pub const BOOTTIME_ALARM: ClockId = ClockId(9);
    pub const TAI: ClockId = ClockId(11);

    /// Sentinel for "no clock id received yet".
    pub const INVALID: ClockId = ClockId(9999);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::REALTIME => "CLOCK_REALTIME",
            Self::MONOTONIC => "CLOCK_MONOTONIC",
            Self::PROCESS_CPUTIME => "CLOCK_PROCESS_CPUTIME_ID",
            Self::THREAD_CPUTIME => "CLOCK_THREAD_CPUTIME_ID",
            Self::MONOTONIC_RAW => "CLOCK_MONOTONIC_RAW",
            Self::REALTIME_COARSE => "CLOCK_REALTIME_COARSE",
            Self::MONOTONIC_COARSE => "CLOCK_MONOTONIC_COARSE",
            Self::BOOTTIME => "CLOCK_BOOTTIME",
            Self::REALTIME_ALARM => "CLOCK_REALTIME_ALARM",
            Self::BOOTTIME_ALARM => "CLOCK_BOOTTIME_ALARM",
            Self::TAI => "CLOCK_TAI",
            Self::INVALID => "invalid",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Timestamp ─────────────────────────────────────────────────────────────

/// A physical clock reading, split like `struct timespec`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub secs: u64,
    /// Always below one second.
    pub nanos: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { secs: 0, nanos: 0 };

    /// Normalizes `nanos` into seconds, saturating at the maximum.
    pub const fn new(secs: u64, nanos: u32) -> Self {
        Self {
            secs: secs.saturating_add(nanos as u64 / NSEC_PER_SEC),
            nanos: (nanos as u64 % NSEC_PER_SEC) as u32,
        }
    }

    pub const fn from_nanos(nanos: u64) -> Self {
        Self {
            secs: nanos / NSEC_PER_SEC,
            nanos: (nanos % NSEC_PER_SEC) as u32,
        }
    }

    /// Reassembles a timestamp whose seconds travel as two 32-bit words.
    ///
    /// `None` if `nanos` is not below one second.
    pub const fn from_proto(secs_hi: u32, secs_lo: u32, nanos: u32) -> Option<Self> {
        if nanos as u64 >= NSEC_PER_SEC {
            return None;
        }
        Some(Self {
            secs: ((secs_hi as u64) << 32) | secs_lo as u64,
            nanos,
        })
    }

    /// Signed nanoseconds from `earlier` to `self`, `None` if it does not fit in `i64`.
    pub fn nanos_since(self, earlier: Timestamp) -> Option<i64> {
        let delta = (self.secs as i128 - earlier.secs as i128) * NSEC_PER_SEC as i128
            + (self.nanos as i128 - earlier.nanos as i128);
        i64::try_from(delta).ok()
    }

    /// Adds nanoseconds, saturating at the representable maximum.
    pub fn add_nanos(self, nanos: u64) -> Timestamp {
        let total = self.nanos as u64 + nanos % NSEC_PER_SEC;
        Timestamp {
            secs: self
                .secs
                .saturating_add(nanos / NSEC_PER_SEC)
                .saturating_add(total / NSEC_PER_SEC),
            nanos: (total % NSEC_PER_SEC) as u32,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

// ── PhysicalClock ─────────────────────────────────────────────────────────

/// Source of physical clock readings.
pub trait PhysicalClock {
    fn read(&self, id: ClockId) -> Result<Timestamp, ClockError>;
}

/// Process clocks backed by the standard library.
///
/// Monotonic-family ids read `Instant` relative to a process-wide anchor; realtime-family
/// ids read `SystemTime`. CPU-time clocks are not available.
#[derive(Debug, Copy, Clone, Default)]
pub struct SystemClock;

static ANCHOR: OnceLock<Instant> = OnceLock::new();

impl PhysicalClock for SystemClock {
    fn read(&self, id: ClockId) -> Result<Timestamp, ClockError> {
        match id {
            ClockId::MONOTONIC
            | ClockId::MONOTONIC_RAW
            | ClockId::MONOTONIC_COARSE
            | ClockId::BOOTTIME
            | ClockId::BOOTTIME_ALARM => {
                let anchor = *ANCHOR.get_or_init(Instant::now);
                // Start one second in so that readings taken before the anchor still fit.
                let elapsed = Instant::now().saturating_duration_since(anchor);
                Ok(Timestamp::new(1 + elapsed.as_secs(), elapsed.subsec_nanos()))
            }
            ClockId::REALTIME | ClockId::REALTIME_COARSE | ClockId::REALTIME_ALARM | ClockId::TAI => {
                let since = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_err(|_| ClockError::Unavailable(id))?;
                Ok(Timestamp::new(since.as_secs(), since.subsec_nanos()))
            }
            other => Err(ClockError::Unavailable(other)),
        }
    }
}

/// Hand-driven clock shared between a simulated compositor and the pacer.
///
/// All clock ids read the same timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.now.get()
    }

    pub fn set(&self, ts: Timestamp) {
        debug_assert!(ts >= self.now.get(), "manual clock must not run backwards");
        self.now.set(ts);
    }

    pub fn advance(&self, nanos: u64) {
        self.now.set(self.now.get().add_nanos(nanos));
    }
}

impl PhysicalClock for ManualClock {
    fn read(&self, _id: ClockId) -> Result<Timestamp, ClockError> {
        Ok(self.now.get())
    }
}
