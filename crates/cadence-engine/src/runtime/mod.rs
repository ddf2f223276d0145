//! The cooperative event loop and the transport contract it runs over.

mod cancel;
mod connection;
mod event_loop;

pub use cancel::CancelToken;
pub use connection::{Connection, Flush, Interest, Readiness, Requests};
pub use event_loop::{run_loop, LoopExit};
