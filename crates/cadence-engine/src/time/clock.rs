use crate::error::ClockError;

use super::physical::{ClockId, PhysicalClock, SystemClock, Timestamp};

/// Nanosecond clock that can be frozen and thawed.
///
/// The value is the number of nanoseconds elapsed since the epoch, excluding every
/// interval during which the clock was frozen. Time instants before the epoch cannot
/// be represented.
///
/// Transitions must strictly alternate (freeze, thaw, freeze, ...) and each transition
/// instant must be at or after the previous one.
#[derive(Debug, Clone)]
pub struct LogicalClock<C = SystemClock> {
    source: C,
    clock_id: ClockId,
    /// Instant of the last init/freeze/thaw.
    base: Timestamp,
    /// Clock value at `base`.
    offset: u64,
    frozen: bool,
}

impl<C: PhysicalClock> LogicalClock<C> {
    /// Creates a running clock whose value at `epoch` is zero.
    pub fn init(source: C, clock_id: ClockId, epoch: Timestamp) -> Self {
        Self {
            source,
            clock_id,
            base: epoch,
            offset: 0,
            frozen: false,
        }
    }

    /// Like [`LogicalClock::init`], with the epoch read from the physical clock.
    pub fn init_now(source: C, clock_id: ClockId) -> Result<Self, ClockError> {
        let epoch = source.read(clock_id)?;
        Ok(Self::init(source, clock_id, epoch))
    }

    pub fn clock_id(&self) -> ClockId {
        self.clock_id
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Reads the underlying physical clock.
    pub fn physical_now(&self) -> Result<Timestamp, ClockError> {
        self.source.read(self.clock_id)
    }

    /// Freezes the clock at `now`.
    ///
    /// Reading any instant at or after `now` returns the value at `now` until thawed.
    pub fn freeze(&mut self, now: Timestamp) -> Result<(), ClockError> {
        if self.frozen {
            return Err(ClockError::AlreadyFrozen);
        }

        let delta = self.forward_delta(now)?;
        let nsec = self.offset.checked_add(delta).ok_or(ClockError::Overflow)?;

        self.base = now;
        self.offset = nsec;
        self.frozen = true;

        Ok(())
    }

    /// Thaws the clock at `now`; counting resumes from the freeze value.
    pub fn thaw(&mut self, now: Timestamp) -> Result<(), ClockError> {
        if !self.frozen {
            return Err(ClockError::NotFrozen);
        }

        self.forward_delta(now)?;

        self.base = now;
        self.frozen = false;

        Ok(())
    }

    /// Converts a physical instant into a clock value.
    ///
    /// While frozen, instants at or after the freeze point read as the freeze value and
    /// earlier instants are extrapolated backwards from it (earlier freezes are not taken
    /// into account). While running, instants before the last transition are rejected.
    pub fn value_at(&self, ts: Timestamp) -> Result<u64, ClockError> {
        let delta = ts.nanos_since(self.base).ok_or(ClockError::Overflow)?;

        if delta >= 0 {
            let nsec = self
                .offset
                .checked_add(delta as u64)
                .ok_or(ClockError::Overflow)?;

            if self.frozen && nsec > self.offset {
                return Ok(self.offset);
            }
            return Ok(nsec);
        }

        let back = delta.unsigned_abs();
        let Some(nsec) = self.offset.checked_sub(back) else {
            return Err(ClockError::BeforeEpoch { ts });
        };

        if !self.frozen {
            return Err(ClockError::BeforeBase {
                ts,
                base: self.base,
            });
        }

        Ok(nsec)
    }

    /// Clock value right now.
    pub fn value_now(&self) -> Result<u64, ClockError> {
        let now = self.physical_now()?;
        self.value_at(now)
    }

    fn forward_delta(&self, now: Timestamp) -> Result<u64, ClockError> {
        let delta = now.nanos_since(self.base).ok_or(ClockError::Overflow)?;
        u64::try_from(delta).map_err(|_| ClockError::TransitionBackwards {
            now,
            base: self.base,
        })
    }
}
