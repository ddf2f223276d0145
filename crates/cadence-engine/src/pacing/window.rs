use crate::error::ProtocolViolation;
use crate::output::{link_refresh_period, OutputId, OutputLink};
use crate::protocol::WindowId;

use super::scheduler::Scheduler;
use super::submission::{Outcome, Released, Resolved, Submission, SubmissionId};

/// Frame-rate report over fixed intervals of logical time.
#[derive(Debug, Clone)]
pub struct FrameStats {
    interval_ns: u64,
    started: u64,
    frames: u32,
}

impl FrameStats {
    pub fn new(interval_ns: u64) -> Self {
        Self {
            interval_ns,
            started: 0,
            frames: 0,
        }
    }

    /// Counts one redraw at `now`; returns the frame rate when an interval completes.
    pub fn on_redraw(&mut self, now: u64) -> Option<f64> {
        if self.frames == 0 {
            self.started = now;
        }

        let mut report = None;
        if now.saturating_sub(self.started) > self.interval_ns {
            let secs = self.interval_ns as f64 / 1e9;
            let fps = self.frames as f64 / secs;
            log::info!("{} frames in {} seconds: {:.3} fps", self.frames, secs, fps);
            report = Some(fps);
            self.started = now;
            self.frames = 0;
        }

        self.frames += 1;
        report
    }
}

/// Per-window pacing state: pending target, in-flight submissions, overlapped outputs.
#[derive(Debug)]
pub struct WindowState {
    id: WindowId,
    scheduler: Scheduler,
    submissions: Vec<Submission>,
    next_submission: u64,
    /// Outputs the surface currently overlaps, in entry order.
    entered: Vec<(OutputId, OutputLink)>,
    stats: FrameStats,
}

impl WindowState {
    pub fn new(id: WindowId, stats_interval_ns: u64) -> Self {
        Self {
            id,
            scheduler: Scheduler::new(),
            submissions: Vec::new(),
            next_submission: 0,
            entered: Vec::new(),
            stats: FrameStats::new(stats_interval_ns),
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn stats_mut(&mut self) -> &mut FrameStats {
        &mut self.stats
    }

    pub fn in_flight(&self) -> usize {
        self.submissions.len()
    }

    pub fn submissions(&self) -> impl Iterator<Item = &Submission> {
        self.submissions.iter()
    }

    /// Starts tracking a new redraw.
    pub fn begin_submission(&mut self, target_time: u64, with_feedback: bool) -> SubmissionId {
        let id = SubmissionId(self.next_submission);
        self.next_submission += 1;
        self.submissions
            .push(Submission::new(id, target_time, with_feedback));
        id
    }

    pub fn submission_mut(&mut self, id: SubmissionId) -> Result<&mut Submission, ProtocolViolation> {
        let window = self.id;
        self.submissions
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or(ProtocolViolation::UnknownSubmission {
                window,
                submission: id,
            })
    }

    /// Removes a submission and turns it into its final record.
    pub fn resolve(&mut self, id: SubmissionId, outcome: Outcome) -> Result<Resolved, ProtocolViolation> {
        let idx = self
            .submissions
            .iter()
            .position(|s| s.id() == id)
            .ok_or(ProtocolViolation::UnknownSubmission {
                window: self.id,
                submission: id,
            })?;
        Ok(self.submissions.remove(idx).resolve(outcome))
    }

    pub fn enter_output(&mut self, output: OutputId, link: OutputLink) -> Result<(), ProtocolViolation> {
        self.prune_dead_outputs();
        if self.entered.iter().any(|(id, _)| *id == output) {
            return Err(ProtocolViolation::OutputEnteredTwice {
                window: self.id,
                output,
            });
        }
        self.entered.push((output, link));
        Ok(())
    }

    pub fn leave_output(&mut self, output: OutputId) -> Result<(), ProtocolViolation> {
        self.prune_dead_outputs();
        let idx = self
            .entered
            .iter()
            .position(|(id, _)| *id == output)
            .ok_or(ProtocolViolation::OutputNotEntered {
                window: self.id,
                output,
            })?;
        self.entered.remove(idx);
        Ok(())
    }

    /// Forgets entered outputs the registry has since dropped.
    pub fn prune_dead_outputs(&mut self) {
        self.entered.retain(|(_, link)| link.strong_count() > 0);
    }

    /// Outputs the surface overlaps and that still exist.
    pub fn overlapped_outputs(&self) -> Vec<OutputId> {
        self.entered
            .iter()
            .filter(|(_, link)| link.strong_count() > 0)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Refresh period of the most recently entered output that is still known.
    pub fn output_period(&self) -> Option<u64> {
        self.entered
            .iter()
            .rev()
            .find_map(|(_, link)| link_refresh_period(link))
    }

    /// Releases every in-flight submission without resolving any of them.
    pub fn teardown(&mut self) -> Vec<(SubmissionId, Released)> {
        self.scheduler.drain_pending();
        self.entered.clear();

        // Two phases: detach first, then release.
        let detached: Vec<Submission> = self.submissions.drain(..).collect();
        detached
            .into_iter()
            .map(|s| (s.id(), s.release()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::output::{ModeFlags, OutputModel};

    fn window() -> WindowState {
        WindowState::new(WindowId(1), 5_000_000_000)
    }

    fn output(id: u32, mhz: i32) -> Rc<RefCell<OutputModel>> {
        let mut o = OutputModel::new(OutputId(id));
        o.apply_mode(ModeFlags::CURRENT, 800, 600, mhz);
        Rc::new(RefCell::new(o))
    }

    #[test]
    fn submissions_get_sequential_ids() {
        let mut w = window();
        assert_eq!(w.begin_submission(10, true), SubmissionId(0));
        assert_eq!(w.begin_submission(20, true), SubmissionId(1));
        assert_eq!(w.in_flight(), 2);
    }

    #[test]
    fn unknown_submission_is_a_violation() {
        let mut w = window();
        let err = w.submission_mut(SubmissionId(4)).unwrap_err();
        assert_eq!(
            err,
            ProtocolViolation::UnknownSubmission {
                window: WindowId(1),
                submission: SubmissionId(4)
            }
        );
    }

    #[test]
    fn resolve_removes_the_submission() {
        let mut w = window();
        let id = w.begin_submission(10, false);
        let outcome = w.submission_mut(id).unwrap().frame_ready(12).unwrap().unwrap();
        let r = w.resolve(id, outcome).unwrap();
        assert_eq!(r.target_time, 10);
        assert_eq!(w.in_flight(), 0);
        assert!(w.resolve(id, Outcome::FrameReadyOnly).is_err());
    }

    #[test]
    fn teardown_releases_everything_outstanding() {
        let mut w = window();
        w.begin_submission(1, true);
        w.begin_submission(2, true);
        let third = w.begin_submission(3, true);
        w.submission_mut(third).unwrap().frame_ready(4).unwrap();
        w.scheduler_mut().schedule(99);

        let released = w.teardown();
        assert_eq!(released.len(), 3);
        assert_eq!(released[2].1, Released { frame: false, feedback: true });
        assert_eq!(w.in_flight(), 0);
        assert_eq!(w.scheduler().pending(), None);
    }

    #[test]
    fn latest_live_output_supplies_the_period() {
        let a = output(1, 60_000);
        let b = output(2, 120_000);
        let mut w = window();
        assert_eq!(w.output_period(), None);

        w.enter_output(OutputId(1), Rc::downgrade(&a)).unwrap();
        w.enter_output(OutputId(2), Rc::downgrade(&b)).unwrap();
        assert_eq!(w.output_period(), Some(8_333_333));

        drop(b);
        assert_eq!(w.output_period(), Some(16_666_666));
        assert_eq!(w.overlapped_outputs(), vec![OutputId(1)]);
    }

    #[test]
    fn unplugged_outputs_are_forgotten() {
        let mut w = window();
        let first = output(10, 60_000);
        w.enter_output(OutputId(10), Rc::downgrade(&first)).unwrap();
        drop(first);

        // Same registry name advertised again after the unplug.
        let again = output(10, 144_000);
        w.enter_output(OutputId(10), Rc::downgrade(&again)).unwrap();
        assert_eq!(w.overlapped_outputs(), vec![OutputId(10)]);
        assert_eq!(w.output_period(), Some(6_944_444));

        drop(again);
        w.prune_dead_outputs();
        assert!(w.overlapped_outputs().is_empty());
        assert!(w.leave_output(OutputId(10)).is_err());
    }

    #[test]
    fn enter_and_leave_must_pair() {
        let a = output(1, 60_000);
        let mut w = window();
        w.enter_output(OutputId(1), Rc::downgrade(&a)).unwrap();
        assert!(w.enter_output(OutputId(1), Rc::downgrade(&a)).is_err());
        w.leave_output(OutputId(1)).unwrap();
        assert!(w.leave_output(OutputId(1)).is_err());
    }

    #[test]
    fn stats_report_after_interval() {
        let mut s = FrameStats::new(1_000);
        assert_eq!(s.on_redraw(0), None);
        for t in 1..=10 {
            assert_eq!(s.on_redraw(t * 100), None);
        }
        // 11 frames counted when the interval is exceeded at t = 1100.
        let fps = s.on_redraw(1_100).unwrap();
        assert!((fps - 11.0 / 1e-6).abs() < 1e-3);
    }
}
