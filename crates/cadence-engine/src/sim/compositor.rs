use std::collections::VecDeque;
use std::io;

use crate::output::{ModeFlags, OutputId};
use crate::pacing::{Released, SubmissionId};
use crate::protocol::{
    Event, FeedbackEvent, FrameEvent, Interface, OutputEvent, PresentFlags, PresentationEvent,
    RegistryEvent, SurfaceEvent, WindowId,
};
use crate::runtime::{CancelToken, Connection, Flush, Interest, Readiness, Requests};
use crate::time::{millihz_to_nsec, ClockId, ManualClock, Timestamp, NSEC_PER_SEC};

/// Registry name of the first simulated output; further outputs follow.
const FIRST_OUTPUT: u32 = 10;

/// Behaviour of the simulated compositor.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of outputs advertised.
    pub outputs: u32,
    /// Refresh rate of every output, in millihertz.
    pub refresh_mhz: i32,
    /// Whether presented events carry the refresh period (otherwise zero).
    pub report_refresh: bool,
    /// Whether the presentation global is advertised.
    pub presentation: bool,
    pub clock_id: ClockId,
    /// Whether the presentation clock id is announced.
    pub send_clock_id: bool,
    pub flags: PresentFlags,
    /// Discard every n-th commit; zero never discards.
    pub discard_every: u64,
    /// Commits past this count are ignored, after which the compositor goes quiet and hangs up.
    pub max_frames: Option<u64>,
    /// Requests accepted per flush before the transport reports it would block.
    pub write_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            outputs: 1,
            refresh_mhz: 60_000,
            report_refresh: true,
            presentation: true,
            clock_id: ClockId::MONOTONIC,
            send_clock_id: true,
            flags: PresentFlags::quality(),
            discard_every: 0,
            max_frames: None,
            write_capacity: 64,
        }
    }
}

/// Counters the simulated compositor keeps about what it received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub commits: u64,
    pub presented: u64,
    pub discarded: u64,
    pub released: u64,
    /// Flushes that stopped at the write capacity.
    pub blocked_flushes: u64,
    pub roundtrips: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    CreateSurface(WindowId),
    Frame(WindowId, SubmissionId),
    Feedback(WindowId, SubmissionId),
    Commit(WindowId, SubmissionId),
    Release(WindowId, SubmissionId),
    DestroySurface(WindowId),
}

/// Deterministic in-process compositor driven by virtual vblanks.
///
/// Time only moves when the event loop blocks: [`Connection::wait`] advances the manual
/// clock to the next scheduled event. Every commit is shown at the first vblank after it.
#[derive(Debug)]
pub struct SimCompositor {
    config: SimConfig,
    clock: ManualClock,
    period_ns: u64,

    outgoing: VecDeque<Request>,
    frames: Vec<(WindowId, SubmissionId)>,
    feedbacks: Vec<(WindowId, SubmissionId)>,
    surfaces: Vec<WindowId>,

    /// Events due at a future instant, in instant order.
    scheduled: Vec<(Timestamp, Event)>,
    /// Arrived but not yet read.
    socket: VecDeque<Event>,
    /// Read and waiting for dispatch.
    queue: VecDeque<Event>,
    read_prepared: bool,

    cancel_on: Option<(u64, CancelToken)>,
    stats: SimStats,
}

impl SimCompositor {
    pub fn new(config: SimConfig) -> Self {
        Self::with_clock(config, ManualClock::new(Timestamp::new(1_000, 0)))
    }

    pub fn with_clock(config: SimConfig, clock: ManualClock) -> Self {
        let period_ns = u32::try_from(config.refresh_mhz)
            .ok()
            .and_then(millihz_to_nsec)
            .unwrap_or(NSEC_PER_SEC / 60);

        Self {
            config,
            clock,
            period_ns,
            outgoing: VecDeque::new(),
            frames: Vec::new(),
            feedbacks: Vec::new(),
            surfaces: Vec::new(),
            scheduled: Vec::new(),
            socket: VecDeque::new(),
            queue: VecDeque::new(),
            read_prepared: false,
            cancel_on: None,
            stats: SimStats::default(),
        }
    }

    /// Clock shared with the client; hand a clone to the pacer.
    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    pub fn read_prepared(&self) -> bool {
        self.read_prepared
    }

    pub fn output_ids(&self) -> impl Iterator<Item = OutputId> {
        (0..self.config.outputs).map(|i| OutputId(FIRST_OUTPUT + i))
    }

    /// Cancels `token` when the given commit arrives, as a signal would mid-run.
    pub fn cancel_on_commit(&mut self, commit: u64, token: CancelToken) {
        self.cancel_on = Some((commit, token));
    }

    /// Delivers an arbitrary event on the next read.
    pub fn inject(&mut self, event: Event) {
        self.socket.push_back(event);
    }

    /// Unplugs an output.
    pub fn remove_output(&mut self, output: OutputId) {
        self.socket
            .push_back(Event::Registry(RegistryEvent::GlobalRemove { name: output.0 }));
    }

    fn globals(&self) -> Vec<Event> {
        let mut events = Vec::new();
        let mut advertise = |name: u32, interface: Interface, version: u32| {
            events.push(Event::Registry(RegistryEvent::Global {
                name,
                interface: interface.name().to_string(),
                version,
            }));
        };

        advertise(1, Interface::Compositor, 4);
        advertise(2, Interface::Shell, 1);
        advertise(4, Interface::Shm, 1);
        advertise(5, Interface::Seat, 5);
        if self.config.presentation {
            advertise(3, Interface::Presentation, 1);
        }
        for id in self.output_ids() {
            advertise(id.0, Interface::Output, 2);
        }
        events
    }

    fn bound_state(&self) -> Vec<Event> {
        let mut events = Vec::new();

        for (i, output) in self.output_ids().enumerate() {
            let batch = [
                OutputEvent::Geometry {
                    mm_width: 520,
                    mm_height: 290,
                    make: "cadence".to_string(),
                    model: format!("virtual-{i}"),
                    transform: 0,
                },
                OutputEvent::Mode {
                    flags: ModeFlags::CURRENT | ModeFlags::PREFERRED,
                    width: 1920,
                    height: 1080,
                    refresh_mhz: self.config.refresh_mhz,
                },
                OutputEvent::Scale(1),
                OutputEvent::Done,
            ];
            events.extend(batch.into_iter().map(|event| Event::Output { output, event }));
        }

        if self.config.presentation && self.config.send_clock_id {
            events.push(Event::Presentation(PresentationEvent::ClockId(
                self.config.clock_id.0,
            )));
        }
        events
    }

    /// The output new surfaces land on and frames sync to.
    fn primary_output(&self) -> Option<OutputId> {
        self.output_ids().last()
    }

    fn next_vblank(&self) -> Timestamp {
        let now = self.clock.now();
        let now_ns = now.secs.saturating_mul(NSEC_PER_SEC).saturating_add(u64::from(now.nanos));
        let vblank = (now_ns / self.period_ns + 1).saturating_mul(self.period_ns);
        Timestamp::from_nanos(vblank)
    }

    fn schedule(&mut self, at: Timestamp, event: Event) {
        let idx = self.scheduled.partition_point(|(t, _)| *t <= at);
        self.scheduled.insert(idx, (at, event));
    }

    fn process(&mut self, request: Request) {
        match request {
            Request::CreateSurface(window) => {
                self.surfaces.push(window);
                if let Some(output) = self.primary_output() {
                    self.socket.push_back(Event::Surface {
                        window,
                        event: SurfaceEvent::Enter(output),
                    });
                }
            }
            Request::Frame(w, s) => self.frames.push((w, s)),
            Request::Feedback(w, s) => self.feedbacks.push((w, s)),
            Request::Commit(window, submission) => self.accept_commit(window, submission),
            Request::Release(window, submission) => {
                self.stats.released += 1;
                self.frames.retain(|&k| k != (window, submission));
                self.feedbacks.retain(|&k| k != (window, submission));
                self.scheduled
                    .retain(|(_, ev)| addressed_submission(ev) != Some((window, submission)));
            }
            Request::DestroySurface(window) => {
                self.surfaces.retain(|&w| w != window);
                self.scheduled
                    .retain(|(_, ev)| addressed_submission(ev).map(|(w, _)| w) != Some(window));
            }
        }
    }

    fn accept_commit(&mut self, window: WindowId, submission: SubmissionId) {
        self.stats.commits += 1;
        let n = self.stats.commits;

        if let Some((at, token)) = &self.cancel_on {
            if *at == n {
                token.cancel();
            }
        }

        let key = (window, submission);
        let wants_frame = self.frames.contains(&key);
        let wants_feedback = self.feedbacks.contains(&key);
        self.frames.retain(|&k| k != key);
        self.feedbacks.retain(|&k| k != key);

        if self.config.max_frames.is_some_and(|max| n > max) {
            log::debug!("sim: commit {n} past the frame budget, ignored");
            return;
        }

        let vblank = self.next_vblank();

        if wants_frame {
            let callback_data = (vblank.secs * 1_000 + u64::from(vblank.nanos) / 1_000_000) as u32;
            self.schedule(
                vblank,
                Event::Frame {
                    window,
                    submission,
                    event: FrameEvent::Done { callback_data },
                },
            );
        }

        if !wants_feedback {
            return;
        }

        if let Some(output) = self.primary_output() {
            self.schedule(
                vblank,
                Event::Feedback {
                    window,
                    submission,
                    event: FeedbackEvent::SyncOutput(output),
                },
            );
        }

        let event = if self.config.discard_every > 0 && n % self.config.discard_every == 0 {
            self.stats.discarded += 1;
            FeedbackEvent::Discarded
        } else {
            self.stats.presented += 1;
            let refresh = if self.config.report_refresh {
                u32::try_from(self.period_ns).unwrap_or(0)
            } else {
                0
            };
            FeedbackEvent::presented(vblank, refresh, n, self.config.flags)
        };
        self.schedule(
            vblank,
            Event::Feedback {
                window,
                submission,
                event,
            },
        );
    }

    fn push(&mut self, request: Request) -> io::Result<()> {
        self.outgoing.push_back(request);
        Ok(())
    }
}

fn addressed_submission(event: &Event) -> Option<(WindowId, SubmissionId)> {
    match event {
        Event::Frame {
            window, submission, ..
        }
        | Event::Feedback {
            window, submission, ..
        } => Some((*window, *submission)),
        _ => None,
    }
}

impl Requests for SimCompositor {
    fn create_surface(&mut self, window: WindowId) -> io::Result<()> {
        self.push(Request::CreateSurface(window))
    }

    fn request_frame(&mut self, window: WindowId, submission: SubmissionId) -> io::Result<()> {
        self.push(Request::Frame(window, submission))
    }

    fn request_feedback(&mut self, window: WindowId, submission: SubmissionId) -> io::Result<()> {
        self.push(Request::Feedback(window, submission))
    }

    fn commit(&mut self, window: WindowId, submission: SubmissionId, _target_time: u64) -> io::Result<()> {
        self.push(Request::Commit(window, submission))
    }

    fn release(&mut self, window: WindowId, submission: SubmissionId, handles: Released) -> io::Result<()> {
        if handles.frame || handles.feedback {
            self.push(Request::Release(window, submission))?;
        }
        Ok(())
    }

    fn destroy_surface(&mut self, window: WindowId) -> io::Result<()> {
        self.push(Request::DestroySurface(window))
    }
}

impl Connection for SimCompositor {
    fn roundtrip(&mut self) -> io::Result<Vec<Event>> {
        while let Some(request) = self.outgoing.pop_front() {
            self.process(request);
        }

        self.stats.roundtrips += 1;
        let mut events: Vec<Event> = self.queue.drain(..).chain(self.socket.drain(..)).collect();
        match self.stats.roundtrips {
            1 => events.extend(self.globals()),
            2 => events.extend(self.bound_state()),
            _ => {}
        }
        Ok(events)
    }

    fn dispatch_pending(&mut self) -> Vec<Event> {
        self.queue.drain(..).collect()
    }

    fn prepare_read(&mut self) -> bool {
        if !self.queue.is_empty() {
            return false;
        }
        debug_assert!(!self.read_prepared, "read prepared twice");
        self.read_prepared = true;
        true
    }

    fn flush(&mut self) -> io::Result<Flush> {
        for _ in 0..self.config.write_capacity {
            let Some(request) = self.outgoing.pop_front() else {
                break;
            };
            self.process(request);
        }

        if self.outgoing.is_empty() {
            Ok(Flush::Done)
        } else {
            self.stats.blocked_flushes += 1;
            Ok(Flush::WouldBlock)
        }
    }

    fn wait(&mut self, interest: Interest) -> io::Result<Readiness> {
        if self.socket.is_empty() {
            if let Some(&(at, _)) = self.scheduled.first() {
                if at > self.clock.now() {
                    self.clock.set(at);
                }
                let due = self.scheduled.partition_point(|(t, _)| *t <= at);
                self.socket
                    .extend(self.scheduled.drain(..due).map(|(_, ev)| ev));
            }
        }

        let readable = !self.socket.is_empty();
        let writable = interest.writable;
        Ok(Readiness {
            readable,
            writable,
            hangup: !readable && !writable,
        })
    }

    fn read_events(&mut self) -> io::Result<()> {
        if !self.read_prepared {
            return Err(io::Error::other("read without prepare"));
        }
        self.read_prepared = false;
        self.queue.extend(self.socket.drain(..));
        Ok(())
    }

    fn cancel_read(&mut self) {
        self.read_prepared = false;
    }
}
