/// Holds at most one pending target time for a window.
#[derive(Debug, Default, Clone)]
pub struct Scheduler {
    pending: Option<u64>,
    overwritten: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the next target. Replacing an unconsumed target is advisory only.
    ///
    /// Returns the replaced value, if any.
    pub fn schedule(&mut self, target_time: u64) -> Option<u64> {
        let previous = self.pending.replace(target_time);

        if let Some(old) = previous {
            self.overwritten += 1;
            log::warn!("rescheduled before redraw: target {old} replaced by {target_time}");
        }

        previous
    }

    /// Takes the pending target, if any.
    pub fn drain_pending(&mut self) -> Option<u64> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<u64> {
        self.pending
    }

    /// Number of advisory overwrites so far.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_consumes() {
        let mut s = Scheduler::new();
        assert_eq!(s.drain_pending(), None);
        s.schedule(10);
        assert_eq!(s.drain_pending(), Some(10));
        assert_eq!(s.drain_pending(), None);
    }

    #[test]
    fn double_schedule_overwrites_and_counts_once() {
        let mut s = Scheduler::new();
        assert_eq!(s.schedule(10), None);
        assert_eq!(s.schedule(20), Some(10));

        assert_eq!(s.overwritten(), 1);
        assert_eq!(s.pending(), Some(20));
        assert_eq!(s.drain_pending(), Some(20));
        assert_eq!(s.drain_pending(), None);
    }

    #[test]
    fn schedule_after_drain_is_not_an_overwrite() {
        let mut s = Scheduler::new();
        s.schedule(1);
        s.drain_pending();
        s.schedule(2);
        assert_eq!(s.overwritten(), 0);
    }
}
