//! Windowed host.
//!
//! Opens a winit window, clears it with wgpu each frame and paces redraws with a
//! [`crate::pacing::Pacer`]. Monitors stand in for outputs; a presented frame stands in for
//! frame-ready, since the windowing system reports no presentation feedback.

mod gpu;
mod outputs;
mod runtime;
mod surface;

pub use gpu::{Gpu, GpuInit, SurfaceErrorAction};
pub use outputs::{monitor_events, MonitorInfo};
pub use runtime::{Host, HostConfig};
