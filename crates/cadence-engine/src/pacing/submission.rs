use std::fmt;

use crate::error::ProtocolViolation;
use crate::output::OutputLink;

/// Per-window sequence number of a submission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(pub u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    /// Requests issued, waiting for frame-ready.
    Created,
    /// The compositor has processed the content; presentation feedback may follow.
    FrameReady,
}

/// How a submission was resolved.
#[derive(Debug, Clone)]
pub enum Outcome {
    Presented {
        presented_time: u64,
        /// Zero when the compositor did not report it.
        refresh_ns: u64,
        sync_output: Option<OutputLink>,
    },
    Discarded {
        sync_output: Option<OutputLink>,
    },
    /// Presentation feedback unsupported; frame-ready is all there is.
    FrameReadyOnly,
}

/// Final record of a resolved submission, handed to the predictor.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub id: SubmissionId,
    pub target_time: u64,
    pub commit_time: Option<u64>,
    pub frame_ready_time: u64,
    pub outcome: Outcome,
}

/// Protocol handles still outstanding when a submission was released early.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Released {
    pub frame: bool,
    pub feedback: bool,
}

/// Timing record of one redraw, from request to resolution.
///
/// Lifecycle: `Created` → `FrameReady` → resolved (presented, discarded, or immediately
/// after frame-ready when presentation feedback is unsupported). Resolution consumes the
/// submission through [`Submission::resolve`].
#[derive(Debug)]
pub struct Submission {
    id: SubmissionId,
    state: SubmissionState,

    target_time: u64,
    commit_time: Option<u64>,
    frame_ready_time: Option<u64>,
    presented_time: Option<u64>,
    refresh_ns: u64,
    sync_output: Option<OutputLink>,

    frame_pending: bool,
    feedback_pending: bool,
}

impl Submission {
    /// Creates a submission aiming at `target_time`.
    ///
    /// A frame-ready request is always outstanding; a feedback request only if
    /// `with_feedback`.
    pub fn new(id: SubmissionId, target_time: u64, with_feedback: bool) -> Self {
        Self {
            id,
            state: SubmissionState::Created,
            target_time,
            commit_time: None,
            frame_ready_time: None,
            presented_time: None,
            refresh_ns: 0,
            sync_output: None,
            frame_pending: true,
            feedback_pending: with_feedback,
        }
    }

    pub fn id(&self) -> SubmissionId {
        self.id
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn target_time(&self) -> u64 {
        self.target_time
    }

    pub fn commit_time(&self) -> Option<u64> {
        self.commit_time
    }

    pub fn frame_ready_time(&self) -> Option<u64> {
        self.frame_ready_time
    }

    pub fn presented_time(&self) -> Option<u64> {
        self.presented_time
    }

    pub fn sync_output(&self) -> Option<&OutputLink> {
        self.sync_output.as_ref()
    }

    pub fn expects_feedback(&self) -> bool {
        self.feedback_pending
    }

    pub fn set_commit_time(&mut self, now: u64) {
        self.commit_time = Some(now);
    }

    /// Records frame-ready. Returns the outcome when nothing else is expected.
    pub fn frame_ready(&mut self, ts: u64) -> Result<Option<Outcome>, ProtocolViolation> {
        if self.state != SubmissionState::Created {
            return Err(ProtocolViolation::FrameReadyTwice(self.id));
        }

        self.frame_ready_time = Some(ts);
        self.frame_pending = false;
        self.state = SubmissionState::FrameReady;

        if self.feedback_pending {
            return Ok(None);
        }
        Ok(Some(Outcome::FrameReadyOnly))
    }

    /// Records the output the frame was synchronized to. The first report wins.
    ///
    /// Returns whether the link was taken.
    pub fn set_sync_output(&mut self, link: OutputLink) -> Result<bool, ProtocolViolation> {
        self.require_feedback()?;

        if self.sync_output.is_some() {
            return Ok(false);
        }
        self.sync_output = Some(link);
        Ok(true)
    }

    /// Records the real presentation time and resolves.
    pub fn presented(&mut self, presented_time: u64, refresh_ns: u64) -> Result<Outcome, ProtocolViolation> {
        self.require_feedback()?;
        self.require_frame_ready()?;

        self.presented_time = Some(presented_time);
        self.refresh_ns = refresh_ns;
        self.feedback_pending = false;

        Ok(Outcome::Presented {
            presented_time,
            refresh_ns,
            sync_output: self.sync_output.clone(),
        })
    }

    /// The compositor declined to show the content.
    pub fn discarded(&mut self) -> Result<Outcome, ProtocolViolation> {
        self.require_feedback()?;
        self.require_frame_ready()?;

        self.feedback_pending = false;

        Ok(Outcome::Discarded {
            sync_output: self.sync_output.clone(),
        })
    }

    /// Consumes the submission into its final record.
    pub fn resolve(self, outcome: Outcome) -> Resolved {
        debug_assert!(!self.frame_pending && !self.feedback_pending);

        Resolved {
            id: self.id,
            target_time: self.target_time,
            commit_time: self.commit_time,
            frame_ready_time: self.frame_ready_time.unwrap_or_default(),
            outcome,
        }
    }

    /// Drops outstanding protocol handles without resolving.
    pub fn release(mut self) -> Released {
        let released = Released {
            frame: self.frame_pending,
            feedback: self.feedback_pending,
        };
        self.frame_pending = false;
        self.feedback_pending = false;
        self.sync_output = None;
        released
    }

    fn require_feedback(&self) -> Result<(), ProtocolViolation> {
        if !self.feedback_pending {
            return Err(ProtocolViolation::FeedbackNotRequested(self.id));
        }
        Ok(())
    }

    fn require_frame_ready(&self) -> Result<(), ProtocolViolation> {
        if self.state != SubmissionState::FrameReady {
            return Err(ProtocolViolation::FeedbackBeforeFrameReady(self.id));
        }
        Ok(())
    }
}
