use std::fmt;

use bitflags::bitflags;

use crate::output::{ModeFlags, OutputId};
use crate::pacing::SubmissionId;
use crate::time::Timestamp;

/// Client-side identity of a window surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globals the client knows how to bind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Interface {
    Compositor,
    Shell,
    Seat,
    Shm,
    Output,
    Presentation,
}

impl Interface {
    pub const ALL: [Interface; 6] = [
        Interface::Compositor,
        Interface::Shell,
        Interface::Seat,
        Interface::Shm,
        Interface::Output,
        Interface::Presentation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Interface::Compositor => "wl_compositor",
            Interface::Shell => "wl_shell",
            Interface::Seat => "wl_seat",
            Interface::Shm => "wl_shm",
            Interface::Output => "wl_output",
            Interface::Presentation => "wp_presentation",
        }
    }

    pub fn from_name(name: &str) -> Option<Interface> {
        Self::ALL.into_iter().find(|i| i.name() == name)
    }

    /// Lowest advertised version the client works with.
    pub fn min_version(self) -> u32 {
        match self {
            Interface::Output => 2,
            _ => 1,
        }
    }

    /// Singletons may be advertised only once.
    pub fn is_singleton(self) -> bool {
        !matches!(self, Interface::Output)
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Presentation flags reported with each presented frame.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct PresentFlags: u32 {
        /// Presentation was synchronized to the vertical retrace.
        const VSYNC = 0x1;
        /// The timestamp came from a hardware clock.
        const HW_CLOCK = 0x2;
        /// Hardware signalled completion of the flip.
        const HW_COMPLETION = 0x4;
        const ZERO_COPY = 0x8;
    }
}

impl PresentFlags {
    /// Flags whose absence degrades timing accuracy.
    pub fn quality() -> PresentFlags {
        PresentFlags::VSYNC | PresentFlags::HW_CLOCK | PresentFlags::HW_COMPLETION
    }
}

// ── events ────────────────────────────────────────────────────────────────

/// Every inbound event, tagged by the object category it addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Registry(RegistryEvent),
    Output { output: OutputId, event: OutputEvent },
    Presentation(PresentationEvent),
    Surface { window: WindowId, event: SurfaceEvent },
    Frame {
        window: WindowId,
        submission: SubmissionId,
        event: FrameEvent,
    },
    Feedback {
        window: WindowId,
        submission: SubmissionId,
        event: FeedbackEvent,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Global {
        name: u32,
        interface: String,
        version: u32,
    },
    GlobalRemove {
        name: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Geometry {
        mm_width: i32,
        mm_height: i32,
        make: String,
        model: String,
        transform: i32,
    },
    Mode {
        flags: ModeFlags,
        width: i32,
        height: i32,
        refresh_mhz: i32,
    },
    Done,
    Scale(i32),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresentationEvent {
    /// Selects the physical clock presentation timestamps are expressed in.
    ClockId(u32),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Enter(OutputId),
    Leave(OutputId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// One-shot acknowledgement; the payload is opaque to the client.
    Done { callback_data: u32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FeedbackEvent {
    SyncOutput(OutputId),
    Presented {
        secs_hi: u32,
        secs_lo: u32,
        nanos: u32,
        refresh_ns: u32,
        seq_hi: u32,
        seq_lo: u32,
        flags: PresentFlags,
    },
    Discarded,
}

impl FeedbackEvent {
    /// Builds a presented event, splitting seconds and sequence into wire words.
    pub fn presented(ts: Timestamp, refresh_ns: u32, seq: u64, flags: PresentFlags) -> Self {
        FeedbackEvent::Presented {
            secs_hi: (ts.secs >> 32) as u32,
            secs_lo: ts.secs as u32,
            nanos: ts.nanos,
            refresh_ns,
            seq_hi: (seq >> 32) as u32,
            seq_lo: seq as u32,
            flags,
        }
    }
}
