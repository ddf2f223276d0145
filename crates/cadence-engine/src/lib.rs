//! Cadence engine crate.
//!
//! Paces a window's redraws against the display's refresh cadence, using compositor
//! presentation feedback when available and frame-ready acknowledgements otherwise.

pub mod error;
pub mod host;
pub mod logging;
pub mod output;
pub mod pacing;
pub mod protocol;
pub mod runtime;
pub mod sim;
pub mod time;

pub use error::{PacingError, PacingResult};
