//! Error taxonomy.
//!
//! Two classes matter to the event loop:
//! - contract violations by the compositor, which are fatal and propagate out of the loop
//! - clock misuse, which is fatal when it comes from our own bookkeeping
//!
//! Advisory conditions (discarded frames, missing quality flags, redundant reschedules)
//! are not errors; they are logged where they happen.

use thiserror::Error;

use crate::output::OutputId;
use crate::pacing::SubmissionId;
use crate::protocol::{Interface, WindowId};
use crate::time::{ClockId, Timestamp};

pub type PacingResult<T> = Result<T, PacingError>;

/// Misuse of a [`crate::time::LogicalClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("clock is already frozen")]
    AlreadyFrozen,

    #[error("clock is not frozen")]
    NotFrozen,

    #[error("transition at {now} precedes the previous transition at {base}")]
    TransitionBackwards { now: Timestamp, base: Timestamp },

    #[error("timestamp {ts} precedes the clock epoch")]
    BeforeEpoch { ts: Timestamp },

    #[error("timestamp {ts} precedes the last transition at {base} while the clock runs")]
    BeforeBase { ts: Timestamp, base: Timestamp },

    #[error("clock value overflows 64 bits")]
    Overflow,

    #[error("physical clock {0} cannot be read")]
    Unavailable(ClockId),
}

/// The compositor broke a protocol contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("global '{0}' advertised twice")]
    DuplicateGlobal(Interface),

    #[error("event for unknown window {0}")]
    UnknownWindow(WindowId),

    #[error("event for unknown submission {submission} on window {window}")]
    UnknownSubmission {
        window: WindowId,
        submission: SubmissionId,
    },

    #[error("reference to unknown output {0}")]
    UnknownOutput(OutputId),

    #[error("frame-ready delivered twice for submission {0}")]
    FrameReadyTwice(SubmissionId),

    #[error("presentation feedback for submission {0} that never requested it")]
    FeedbackNotRequested(SubmissionId),

    #[error("presentation feedback for submission {0} arrived before frame-ready")]
    FeedbackBeforeFrameReady(SubmissionId),

    #[error("presentation timestamp for submission {submission} has {nanos} nanoseconds")]
    InvalidTimestamp { submission: SubmissionId, nanos: u32 },

    #[error("window {window} entered output {output} twice")]
    OutputEnteredTwice { window: WindowId, output: OutputId },

    #[error("window {window} left output {output} it never entered")]
    OutputNotEntered { window: WindowId, output: OutputId },

    #[error("clock contract broken: {0}")]
    Clock(#[from] ClockError),
}

/// Startup cannot proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("required global '{0}' is not advertised")]
    MissingGlobal(Interface),

    #[error("no display outputs found")]
    NoOutputs,

    #[error("no surface format with {0} bits per pixel")]
    NoSurfaceFormat(u32),

    #[error("window creation failed: {0}")]
    Window(String),

    #[error("GPU initialization failed: {0}")]
    Gpu(String),
}

/// Umbrella error returned by the pacer and the event loop.
#[derive(Debug, Error)]
pub enum PacingError {
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl PacingError {
    /// True for a misbehaving peer or broken clock bookkeeping, as opposed to setup or I/O.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, PacingError::Protocol(_) | PacingError::Clock(_))
    }
}
