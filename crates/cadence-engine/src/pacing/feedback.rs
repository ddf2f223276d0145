use crate::protocol::PresentFlags;

/// Session-wide memory of which missing quality flags were already reported.
#[derive(Debug, Default, Clone)]
pub struct FeedbackWarnings {
    warned: PresentFlags,
    discarded: u64,
}

impl FeedbackWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Warns once per session for each quality flag missing from `flags`.
    ///
    /// Returns how many warnings were emitted by this call.
    pub fn check_presented(&mut self, flags: PresentFlags) -> usize {
        let mut emitted = 0;

        let missing = PresentFlags::quality() - flags - self.warned;
        for (name, _) in missing.iter_names() {
            emitted += 1;
            log::warn!("presentation lacks the {name} flag, timings may be inaccurate");
        }
        self.warned |= missing;

        emitted
    }

    /// Discards are reported every time.
    pub fn note_discarded(&mut self) {
        self.discarded += 1;
        log::warn!("frame discarded unexpectedly");
    }

    pub fn warned_flags(&self) -> PresentFlags {
        self.warned
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
