//! Frame pacing.
//!
//! A redraw creates a [`Submission`]; frame-ready and presentation feedback walk it through
//! its lifecycle; on resolution the [`predictor`] computes the next target time and the
//! window's [`Scheduler`] holds it until the next idle pass. [`Pacer`] ties these together
//! for every window.

mod feedback;
mod pacer;
pub mod predictor;
mod scheduler;
mod submission;
mod window;

pub use feedback::FeedbackWarnings;
pub use pacer::{apply_global_event, Pacer, PacerConfig};
pub use predictor::{PeriodSource, Prediction};
pub use scheduler::Scheduler;
pub use submission::{Outcome, Released, Resolved, Submission, SubmissionId, SubmissionState};
pub use window::{FrameStats, WindowState};
