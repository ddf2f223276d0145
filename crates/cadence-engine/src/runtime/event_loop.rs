use std::io;

use crate::error::PacingResult;
use crate::pacing::Pacer;
use crate::time::PhysicalClock;

use super::cancel::CancelToken;
use super::connection::{Connection, Flush, Interest, Readiness};

/// Why [`run_loop`] returned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    /// The peer closed the connection.
    Hangup,
}

/// Drives `pacer` over `conn` until cancelled, hung up, or a fatal error.
///
/// Each iteration: dispatch queued events, run one idle pass, prepare a read, flush, block,
/// then read or cancel the prepared read. The cancellation token is checked once per
/// iteration, before any work starts.
pub fn run_loop<C, T>(pacer: &mut Pacer<C>, conn: &mut T, cancel: &CancelToken) -> PacingResult<LoopExit>
where
    C: PhysicalClock,
    T: Connection + ?Sized,
{
    while !cancel.is_cancelled() {
        dispatch(pacer, conn)?;
        pacer.idle_pass(conn)?;

        while !conn.prepare_read() {
            dispatch(pacer, conn)?;
        }

        let readiness = match flush_and_wait(conn) {
            Ok(r) => r,
            Err(err) => {
                conn.cancel_read();
                return Err(err.into());
            }
        };

        if readiness.readable {
            conn.read_events()?;
        } else {
            conn.cancel_read();
        }

        if readiness.writable {
            // Retried on the next iteration if still full.
            conn.flush()?;
        }

        if readiness.hangup {
            dispatch(pacer, conn)?;
            log::info!("compositor hung up");
            return Ok(LoopExit::Hangup);
        }
    }

    log::info!("cancelled");
    Ok(LoopExit::Cancelled)
}

fn dispatch<C: PhysicalClock, T: Connection + ?Sized>(pacer: &mut Pacer<C>, conn: &mut T) -> PacingResult<()> {
    for event in conn.dispatch_pending() {
        pacer.handle(event)?;
    }
    Ok(())
}

fn flush_and_wait<T: Connection + ?Sized>(conn: &mut T) -> io::Result<Readiness> {
    let interest = match conn.flush()? {
        Flush::Done => Interest::READ,
        Flush::WouldBlock => {
            log::trace!("outgoing buffer full, waiting for writability");
            Interest::READ_WRITE
        }
    };
    conn.wait(interest)
}
