//! Simulated compositor for tests and dry runs.

mod compositor;

pub use compositor::{SimCompositor, SimConfig, SimStats};
