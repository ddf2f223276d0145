//! Display outputs.
//!
//! Each output tracks its advertised video modes; the current mode's refresh rate is the
//! fallback period when presentation feedback does not report one.

mod model;
mod registry;

pub use model::{ModeFlags, OutputId, OutputModel, Transform, VideoMode};
pub use registry::{link_refresh_period, OutputHandle, OutputLink, OutputRegistry};
