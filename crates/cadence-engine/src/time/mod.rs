//! Time subsystem.
//!
//! Frame timestamps are expressed on a [`LogicalClock`]: nanoseconds since an epoch,
//! excluding intervals where the clock was frozen (display blanked, session switched).
//! Physical readings come from a [`PhysicalClock`], so tests and the simulator can drive
//! time by hand.

mod clock;
mod physical;

pub use clock::LogicalClock;
pub use physical::{
    millihz_to_nsec, ClockId, ManualClock, PhysicalClock, SystemClock, Timestamp, NSEC_PER_SEC,
};
