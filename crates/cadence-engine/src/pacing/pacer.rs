use crate::error::{PacingResult, ProtocolViolation};
use crate::protocol::{
    ClockSource, DisplayGlobals, Event, FeedbackEvent, FrameEvent, RegistryEvent, SurfaceEvent,
    WindowId,
};
use crate::runtime::{Connection, Requests};
use crate::time::{millihz_to_nsec, LogicalClock, PhysicalClock, SystemClock, Timestamp};

use super::feedback::FeedbackWarnings;
use super::predictor::{self, DEFAULT_PERIOD_NS, DEFAULT_REFRESH_MHZ};
use super::submission::{Outcome, SubmissionId};
use super::window::WindowState;

/// Pacer tuning.
#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// Refresh rate assumed when no output reports one.
    pub default_refresh_mhz: u32,
    /// Logical-time span of each frame-rate report.
    pub stats_interval_ns: u64,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            default_refresh_mhz: DEFAULT_REFRESH_MHZ,
            stats_interval_ns: 5_000_000_000,
        }
    }
}

/// Applies an event addressed to a global or an output.
///
/// Window-addressed events cannot be handled here; before any window exists they name an
/// unknown one.
pub fn apply_global_event(globals: &mut DisplayGlobals, event: Event) -> Result<(), ProtocolViolation> {
    match event {
        Event::Registry(e) => globals.handle_registry(e),
        Event::Output { output, event } => globals.handle_output(output, event),
        Event::Presentation(e) => {
            globals.handle_presentation(e);
            Ok(())
        }
        Event::Surface { window, .. } | Event::Frame { window, .. } | Event::Feedback { window, .. } => {
            Err(ProtocolViolation::UnknownWindow(window))
        }
    }
}

/// Single-threaded owner of the clock, the outputs and every window's pacing state.
///
/// Inbound events go through [`Pacer::handle`]; redraws are issued from
/// [`Pacer::idle_pass`]. Nothing here blocks.
#[derive(Debug)]
pub struct Pacer<C = SystemClock> {
    config: PacerConfig,
    fallback_ns: u64,

    globals: DisplayGlobals,
    clock: LogicalClock<C>,
    source: ClockSource,

    windows: Vec<WindowState>,
    next_window: u32,
    warnings: FeedbackWarnings,
}

impl<C: PhysicalClock> Pacer<C> {
    /// Runs the setup roundtrips on `conn` and starts the clock.
    pub fn connect<T: Connection + ?Sized>(conn: &mut T, physical: C, config: PacerConfig) -> PacingResult<Self> {
        let mut globals = DisplayGlobals::new();

        // First roundtrip lists the globals, the second returns what binding them produced.
        for _ in 0..2 {
            for event in conn.roundtrip()? {
                apply_global_event(&mut globals, event)?;
            }
        }

        Self::from_globals(globals, physical, config)
    }

    /// Starts the clock against registry state gathered elsewhere.
    pub fn from_globals(globals: DisplayGlobals, physical: C, config: PacerConfig) -> PacingResult<Self> {
        let source = globals.finish()?;
        let clock = LogicalClock::init_now(physical, source.clock_id())?;

        globals.outputs().log_summary();
        if let Some(chosen) = globals.outputs().chosen() {
            log::info!("chosen output: {}", chosen.borrow().summary());
        }
        let id = source.clock_id();
        log::info!("Using {}, clock id {} ({})", source.describe(), id, id.name());

        let fallback_ns = millihz_to_nsec(config.default_refresh_mhz).unwrap_or(DEFAULT_PERIOD_NS);

        Ok(Self {
            config,
            fallback_ns,
            globals,
            clock,
            source,
            windows: Vec::new(),
            next_window: 0,
            warnings: FeedbackWarnings::new(),
        })
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn clock(&self) -> &LogicalClock<C> {
        &self.clock
    }

    pub fn source(&self) -> ClockSource {
        self.source
    }

    pub fn globals(&self) -> &DisplayGlobals {
        &self.globals
    }

    pub fn warnings(&self) -> &FeedbackWarnings {
        &self.warnings
    }

    pub fn windows(&self) -> &[WindowState] {
        &self.windows
    }

    pub fn window(&self, id: WindowId) -> Option<&WindowState> {
        self.windows.iter().find(|w| w.id() == id)
    }

    /// Whether any window has a target waiting for the next idle pass.
    pub fn has_pending_redraw(&self) -> bool {
        self.windows.iter().any(|w| w.scheduler().pending().is_some())
    }

    fn window_mut(&mut self, id: WindowId) -> Result<&mut WindowState, ProtocolViolation> {
        self.windows
            .iter_mut()
            .find(|w| w.id() == id)
            .ok_or(ProtocolViolation::UnknownWindow(id))
    }

    // ── windows ───────────────────────────────────────────────────────────

    /// Creates a window whose first redraw aims at the current logical time.
    pub fn create_window<R: Requests + ?Sized>(&mut self, requests: &mut R) -> PacingResult<WindowId> {
        let id = WindowId(self.next_window);
        self.next_window += 1;

        requests.create_surface(id)?;

        let mut window = WindowState::new(id, self.config.stats_interval_ns);
        window.scheduler_mut().schedule(self.clock.value_now()?);
        self.windows.push(window);

        log::debug!("window {id} created");
        Ok(id)
    }

    /// Asks for a redraw aimed at `target_time`, replacing any pending target.
    ///
    /// Returns the replaced target.
    pub fn schedule(&mut self, window: WindowId, target_time: u64) -> PacingResult<Option<u64>> {
        Ok(self.window_mut(window)?.scheduler_mut().schedule(target_time))
    }

    /// Tears a window down, releasing its in-flight submissions without predicting.
    ///
    /// Returns how many submissions were released.
    pub fn destroy_window<R: Requests + ?Sized>(&mut self, id: WindowId, requests: &mut R) -> PacingResult<usize> {
        let idx = self
            .windows
            .iter()
            .position(|w| w.id() == id)
            .ok_or(ProtocolViolation::UnknownWindow(id))?;
        let mut window = self.windows.remove(idx);

        let released = window.teardown();
        for (submission, handles) in &released {
            requests.release(id, *submission, *handles)?;
        }
        requests.destroy_surface(id)?;

        log::debug!("window {id} destroyed, {} submissions released", released.len());
        Ok(released.len())
    }

    /// Destroys every window, then drops the outputs.
    ///
    /// Returns how many outputs were still referenced elsewhere.
    pub fn shutdown<R: Requests + ?Sized>(&mut self, requests: &mut R) -> PacingResult<usize> {
        let ids: Vec<WindowId> = self.windows.iter().map(|w| w.id()).collect();
        for id in ids {
            self.destroy_window(id, requests)?;
        }
        Ok(self.globals.outputs_mut().release_all())
    }

    // ── clock suspension ──────────────────────────────────────────────────

    /// Stops logical time, e.g. while the display is blanked.
    pub fn suspend(&mut self) -> PacingResult<()> {
        let now = self.clock.physical_now()?;
        self.suspend_at(now)
    }

    pub fn suspend_at(&mut self, now: Timestamp) -> PacingResult<()> {
        self.clock.freeze(now)?;
        log::info!("clock frozen at {now}");
        Ok(())
    }

    pub fn resume(&mut self) -> PacingResult<()> {
        let now = self.clock.physical_now()?;
        self.resume_at(now)
    }

    pub fn resume_at(&mut self, now: Timestamp) -> PacingResult<()> {
        self.clock.thaw(now)?;
        log::info!("clock thawed at {now}");
        Ok(())
    }

    // ── redraw ────────────────────────────────────────────────────────────

    /// Issues one redraw for every window with a pending target.
    ///
    /// Returns how many redraws were issued.
    pub fn idle_pass<R: Requests + ?Sized>(&mut self, requests: &mut R) -> PacingResult<usize> {
        let with_feedback = self.globals.has_presentation();
        let mut redraws = 0;

        for idx in 0..self.windows.len() {
            let Some(target) = self.windows[idx].scheduler_mut().drain_pending() else {
                continue;
            };
            self.redraw(idx, target, with_feedback, requests)?;
            redraws += 1;
        }

        Ok(redraws)
    }

    fn redraw<R: Requests + ?Sized>(
        &mut self,
        idx: usize,
        target_time: u64,
        with_feedback: bool,
        requests: &mut R,
    ) -> PacingResult<()> {
        let window = &mut self.windows[idx];
        let id = window.id();
        let submission = window.begin_submission(target_time, with_feedback);

        requests.request_frame(id, submission)?;
        if with_feedback {
            requests.request_feedback(id, submission)?;
        }
        requests.commit(id, submission, target_time)?;

        let now = self.clock.value_now()?;
        window.submission_mut(submission)?.set_commit_time(now);
        window.stats_mut().on_redraw(now);

        log::trace!("window {id}: submission {submission} committed for {target_time}");
        Ok(())
    }

    // ── events ────────────────────────────────────────────────────────────

    /// Applies one inbound event.
    pub fn handle(&mut self, event: Event) -> PacingResult<()> {
        match event {
            Event::Surface { window, event } => self.on_surface(window, event)?,
            Event::Frame {
                window,
                submission,
                event: FrameEvent::Done { .. },
            } => self.on_frame_done(window, submission)?,
            Event::Feedback {
                window,
                submission,
                event,
            } => self.on_feedback(window, submission, event)?,
            Event::Registry(e) => {
                let removal = matches!(e, RegistryEvent::GlobalRemove { .. });
                self.globals.handle_registry(e)?;
                if removal {
                    for window in &mut self.windows {
                        window.prune_dead_outputs();
                    }
                }
            }
            other => apply_global_event(&mut self.globals, other)?,
        }
        Ok(())
    }

    fn on_surface(&mut self, id: WindowId, event: SurfaceEvent) -> PacingResult<()> {
        match event {
            SurfaceEvent::Enter(output) => {
                let link = self.globals.outputs().link(output);
                let window = self.window_mut(id)?;
                match link {
                    Some(link) => window.enter_output(output, link)?,
                    None => log::debug!("window {id} entered unknown output {output}, ignored"),
                }
            }
            SurfaceEvent::Leave(output) => {
                let known = self.globals.outputs().get(output).is_some();
                let window = self.window_mut(id)?;
                let entered = window.overlapped_outputs().contains(&output);
                if entered || known {
                    window.leave_output(output)?;
                }
            }
        }
        Ok(())
    }

    fn on_frame_done(&mut self, id: WindowId, submission: SubmissionId) -> PacingResult<()> {
        let now = self.clock.value_now()?;
        let outcome = self
            .window_mut(id)?
            .submission_mut(submission)?
            .frame_ready(now)?;

        if let Some(outcome) = outcome {
            self.resolve(id, submission, outcome)?;
        }
        Ok(())
    }

    fn on_feedback(&mut self, id: WindowId, submission: SubmissionId, event: FeedbackEvent) -> PacingResult<()> {
        match event {
            FeedbackEvent::SyncOutput(output) => {
                let link = self.globals.outputs().link(output);
                let sub = self.window_mut(id)?.submission_mut(submission)?;
                match link {
                    Some(link) => {
                        if !sub.set_sync_output(link)? {
                            log::debug!("submission {submission}: repeated sync output {output} ignored");
                        }
                    }
                    None => log::debug!("submission {submission}: sync output {output} is unknown"),
                }
            }
            FeedbackEvent::Presented {
                secs_hi,
                secs_lo,
                nanos,
                refresh_ns,
                flags,
                ..
            } => {
                let ts = Timestamp::from_proto(secs_hi, secs_lo, nanos)
                    .ok_or(ProtocolViolation::InvalidTimestamp { submission, nanos })?;
                let presented_time = match self.clock.value_at(ts) {
                    Ok(value) => value,
                    Err(err) => {
                        log::warn!("presentation timestamp {ts} rejected ({err}), using current time");
                        self.clock.value_now()?
                    }
                };

                let outcome = self
                    .window_mut(id)?
                    .submission_mut(submission)?
                    .presented(presented_time, u64::from(refresh_ns))?;
                self.warnings.check_presented(flags);
                self.resolve(id, submission, outcome)?;
            }
            FeedbackEvent::Discarded => {
                let outcome = self.window_mut(id)?.submission_mut(submission)?.discarded()?;
                self.warnings.note_discarded();
                self.resolve(id, submission, outcome)?;
            }
        }
        Ok(())
    }

    /// Consumes a submission, predicts the next target and schedules it.
    fn resolve(&mut self, id: WindowId, submission: SubmissionId, outcome: Outcome) -> PacingResult<()> {
        let now = self.clock.value_now()?;
        let guessed = self
            .globals
            .outputs()
            .chosen()
            .and_then(|o| o.borrow().refresh_period_ns());
        let fallback_ns = self.fallback_ns;

        let window = self.window_mut(id)?;
        let resolved = window.resolve(submission, outcome)?;
        let window_output_ns = window.output_period().or(guessed);

        let prediction = predictor::predict(&resolved, now, window_output_ns, fallback_ns);
        log::trace!(
            "window {id}: submission {submission} resolved, next target {} ({:?}, period {})",
            prediction.target_time,
            prediction.source,
            prediction.period_ns,
        );

        window.scheduler_mut().schedule(prediction.target_time);
        Ok(())
    }
}
