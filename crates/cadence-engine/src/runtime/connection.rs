use std::io;

use crate::pacing::{Released, SubmissionId};
use crate::protocol::{Event, WindowId};

/// Outgoing requests the pacer issues on behalf of a window.
///
/// Requests are buffered by the implementation and only leave the process on
/// [`Connection::flush`].
pub trait Requests {
    fn create_surface(&mut self, window: WindowId) -> io::Result<()>;

    /// Asks for a one-shot frame-ready acknowledgement for `submission`.
    fn request_frame(&mut self, window: WindowId, submission: SubmissionId) -> io::Result<()>;

    /// Asks for presentation feedback for `submission`.
    fn request_feedback(&mut self, window: WindowId, submission: SubmissionId) -> io::Result<()>;

    /// Draws the content aimed at `target_time` and commits it.
    fn commit(&mut self, window: WindowId, submission: SubmissionId, target_time: u64) -> io::Result<()>;

    /// Drops the handles still outstanding on a submission torn down early.
    fn release(&mut self, window: WindowId, submission: SubmissionId, handles: Released) -> io::Result<()>;

    fn destroy_surface(&mut self, window: WindowId) -> io::Result<()>;
}

/// Result of pushing buffered requests to the peer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flush {
    /// Everything was written.
    Done,
    /// The transport is full; wait for writability and flush again.
    WouldBlock,
}

/// What the event loop blocks on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Interest {
    pub writable: bool,
}

impl Interest {
    pub const READ: Interest = Interest { writable: false };
    pub const READ_WRITE: Interest = Interest { writable: true };
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub hangup: bool,
}

/// Transport to the compositor.
///
/// Reading follows a prepare/read protocol: after [`Connection::prepare_read`] succeeds,
/// the caller must finish with exactly one of [`Connection::read_events`] or
/// [`Connection::cancel_read`].
pub trait Connection: Requests {
    /// Flushes, then blocks until the peer has processed everything sent so far.
    /// Returns the events received in the meantime.
    fn roundtrip(&mut self) -> io::Result<Vec<Event>>;

    /// Takes the events already read and queued.
    fn dispatch_pending(&mut self) -> Vec<Event>;

    /// Announces an intent to read. Fails (returns `false`) while events are queued.
    fn prepare_read(&mut self) -> bool;

    fn flush(&mut self) -> io::Result<Flush>;

    /// Blocks until the transport is ready for `interest` or hung up.
    fn wait(&mut self, interest: Interest) -> io::Result<Readiness>;

    /// Completes a prepared read, queueing whatever arrived.
    fn read_events(&mut self) -> io::Result<()>;

    /// Abandons a prepared read.
    fn cancel_read(&mut self);
}
