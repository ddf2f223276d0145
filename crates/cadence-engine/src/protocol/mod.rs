//! Inbound compositor events and registry state.
//!
//! Events are a tagged union per object category. The transport decodes wire messages
//! into [`Event`] values; the pacer matches on them.

mod events;
mod globals;

pub use events::{
    Event, FeedbackEvent, FrameEvent, Interface, OutputEvent, PresentFlags, PresentationEvent,
    RegistryEvent, SurfaceEvent, WindowId,
};
pub use globals::{ClockSource, DisplayGlobals};
