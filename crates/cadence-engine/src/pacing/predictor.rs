//! Next-target prediction from a resolved submission.
//!
//! Pure functions: every input (current time, candidate periods) is passed in.

use crate::output::{link_refresh_period, OutputLink};

use super::submission::{Outcome, Resolved};

/// Refresh rate assumed when nothing better is known.
pub const DEFAULT_REFRESH_MHZ: u32 = 60_000;

/// Period of [`DEFAULT_REFRESH_MHZ`], by the same integer formula outputs use.
pub const DEFAULT_PERIOD_NS: u64 = 1_000_000_000_000 / DEFAULT_REFRESH_MHZ as u64;

/// Where the period used for a prediction came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PeriodSource {
    /// Reported by presentation feedback.
    Measured,
    /// Current mode of the output the frame was synchronized to.
    SyncOutput,
    /// Current mode of the output the window overlaps.
    WindowOutput,
    Fallback,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub target_time: u64,
    pub period_ns: u64,
    pub source: PeriodSource,
}

/// Candidate periods, in order of preference after a measured one.
#[derive(Debug, Clone, Copy)]
pub struct PeriodHints<'a> {
    pub sync_output: Option<&'a OutputLink>,
    pub window_output_ns: Option<u64>,
    pub fallback_ns: u64,
}

impl PeriodHints<'_> {
    fn pick(&self) -> (u64, PeriodSource) {
        if let Some(ns) = self.sync_output.and_then(link_refresh_period) {
            return (ns, PeriodSource::SyncOutput);
        }
        if let Some(ns) = self.window_output_ns {
            return (ns, PeriodSource::WindowOutput);
        }
        (self.fallback_ns, PeriodSource::Fallback)
    }
}

/// Next target one refresh after the reported presentation.
pub fn from_presented(presented_time: u64, measured_ns: u64, hints: PeriodHints<'_>) -> Prediction {
    let (period_ns, source) = if measured_ns > 0 {
        (measured_ns, PeriodSource::Measured)
    } else {
        hints.pick()
    };

    Prediction {
        target_time: presented_time.saturating_add(period_ns),
        period_ns,
        source,
    }
}

/// Next target when only frame-ready is known.
///
/// Frame-ready is assumed to arrive about half a period before the frame it describes is
/// shown, so the next submission aims one and a half periods out.
pub fn from_frame_ready(now: u64, hints: PeriodHints<'_>) -> Prediction {
    let (period_ns, source) = hints.pick();

    Prediction {
        target_time: now.saturating_add(period_ns.saturating_mul(3) / 2),
        period_ns,
        source,
    }
}

/// Dispatches on how the submission was resolved.
pub fn predict(
    resolved: &Resolved,
    now: u64,
    window_output_ns: Option<u64>,
    fallback_ns: u64,
) -> Prediction {
    match &resolved.outcome {
        Outcome::Presented {
            presented_time,
            refresh_ns,
            sync_output,
        } => from_presented(
            *presented_time,
            *refresh_ns,
            PeriodHints {
                sync_output: sync_output.as_ref(),
                window_output_ns,
                fallback_ns,
            },
        ),
        Outcome::Discarded { sync_output } => from_frame_ready(
            now,
            PeriodHints {
                sync_output: sync_output.as_ref(),
                window_output_ns,
                fallback_ns,
            },
        ),
        Outcome::FrameReadyOnly => from_frame_ready(
            now,
            PeriodHints {
                sync_output: None,
                window_output_ns,
                fallback_ns,
            },
        ),
    }
}
