//! End-to-end runs of the event loop against the simulated compositor.

use cadence_engine::output::OutputId;
use cadence_engine::pacing::{Pacer, PacerConfig, SubmissionId};
use cadence_engine::protocol::{
    ClockSource, Event, FeedbackEvent, FrameEvent, Interface, OutputEvent, PresentFlags, RegistryEvent,
    SurfaceEvent, WindowId,
};
use cadence_engine::runtime::{run_loop, CancelToken, Connection, LoopExit};
use cadence_engine::sim::{SimCompositor, SimConfig};
use cadence_engine::time::{ClockId, ManualClock, Timestamp};
use cadence_engine::PacingError;
use proptest::prelude::*;

const PERIOD_60HZ: u64 = 16_666_666;

fn connect(config: SimConfig) -> (SimCompositor, Pacer<ManualClock>, WindowId) {
    let mut sim = SimCompositor::new(config);
    let clock = sim.clock();
    let mut pacer = Pacer::connect(&mut sim, clock, PacerConfig::default()).unwrap();
    let window = pacer.create_window(&mut sim).unwrap();
    (sim, pacer, window)
}

fn run(config: SimConfig) -> (SimCompositor, Pacer<ManualClock>, WindowId, LoopExit) {
    let (mut sim, mut pacer, window) = connect(config);
    let exit = run_loop(&mut pacer, &mut sim, &CancelToken::new()).unwrap();
    (sim, pacer, window, exit)
}

/// Target of the single submission left in flight once the compositor went quiet.
fn last_target(pacer: &Pacer<ManualClock>, window: WindowId) -> u64 {
    let state = pacer.window(window).unwrap();
    assert_eq!(state.in_flight(), 1);
    state.submissions().next().unwrap().target_time()
}

fn first_submission(pacer: &Pacer<ManualClock>, window: WindowId) -> SubmissionId {
    pacer.window(window).unwrap().submissions().next().unwrap().id()
}

#[test]
fn presented_frames_aim_one_period_after_presentation() {
    let (sim, pacer, w, exit) = run(SimConfig {
        max_frames: Some(10),
        ..SimConfig::default()
    });

    assert_eq!(exit, LoopExit::Hangup);
    assert_eq!(pacer.source(), ClockSource::Presentation(ClockId::MONOTONIC));

    let stats = sim.stats();
    assert_eq!(stats.presented, 10);
    assert_eq!(stats.commits, 11);
    assert_eq!(stats.discarded, 0);

    // The clock stopped at the last vblank, which is when the tenth frame was presented.
    let presented = pacer.clock().value_now().unwrap();
    assert_eq!(last_target(&pacer, w), presented + PERIOD_60HZ);
    assert_eq!(pacer.window(w).unwrap().scheduler().overwritten(), 0);
    assert!(pacer.warnings().warned_flags().is_empty());
}

#[test]
fn missing_refresh_falls_back_to_the_sync_output_mode() {
    let (_, pacer, w, _) = run(SimConfig {
        refresh_mhz: 120_000,
        report_refresh: false,
        max_frames: Some(1),
        ..SimConfig::default()
    });

    let presented = pacer.clock().value_now().unwrap();
    assert_eq!(last_target(&pacer, w), presented + 8_333_333);
}

#[test]
fn frame_ready_only_aims_one_and_a_half_periods_out() {
    let (sim, pacer, w, exit) = run(SimConfig {
        presentation: false,
        max_frames: Some(1),
        ..SimConfig::default()
    });

    assert_eq!(exit, LoopExit::Hangup);
    assert_eq!(pacer.source(), ClockSource::FrameCallback);
    assert_eq!(sim.stats().presented, 0);

    let ready = pacer.clock().value_now().unwrap();
    assert_eq!(last_target(&pacer, w), ready + PERIOD_60HZ * 3 / 2);
}

#[test]
fn unannounced_clock_still_paces() {
    let (sim, pacer, _, exit) = run(SimConfig {
        send_clock_id: false,
        max_frames: Some(3),
        ..SimConfig::default()
    });

    assert_eq!(exit, LoopExit::Hangup);
    assert_eq!(pacer.source(), ClockSource::Unannounced);
    assert_eq!(sim.stats().presented, 3);
}

#[test]
fn discards_and_weak_flags_are_counted() {
    let (sim, pacer, _, exit) = run(SimConfig {
        discard_every: 2,
        max_frames: Some(6),
        flags: PresentFlags::VSYNC,
        ..SimConfig::default()
    });

    assert_eq!(exit, LoopExit::Hangup);
    assert_eq!(sim.stats().discarded, 3);
    assert_eq!(sim.stats().presented, 3);
    assert_eq!(pacer.warnings().discarded(), 3);

    let warned = pacer.warnings().warned_flags();
    assert!(warned.contains(PresentFlags::HW_CLOCK));
    assert!(warned.contains(PresentFlags::HW_COMPLETION));
    assert!(!warned.contains(PresentFlags::VSYNC));
}

#[test]
fn full_write_buffer_only_delays_requests() {
    let (sim, _, _, exit) = run(SimConfig {
        write_capacity: 1,
        max_frames: Some(5),
        ..SimConfig::default()
    });

    assert_eq!(exit, LoopExit::Hangup);
    assert!(sim.stats().blocked_flushes > 0);
    assert_eq!(sim.stats().presented, 5);
}

#[test]
fn cancellation_stops_with_no_read_prepared() {
    let (mut sim, mut pacer, _) = connect(SimConfig::default());
    let cancel = CancelToken::new();
    sim.cancel_on_commit(3, cancel.clone());

    let exit = run_loop(&mut pacer, &mut sim, &cancel).unwrap();

    assert_eq!(exit, LoopExit::Cancelled);
    assert!(!sim.read_prepared());
    assert_eq!(sim.stats().commits, 3);
}

#[test]
fn cancelled_before_start_does_nothing() {
    let (mut sim, mut pacer, w) = connect(SimConfig::default());
    let cancel = CancelToken::new();
    cancel.cancel();

    assert_eq!(run_loop(&mut pacer, &mut sim, &cancel).unwrap(), LoopExit::Cancelled);
    assert_eq!(sim.stats().commits, 0);
    assert!(pacer.window(w).unwrap().scheduler().pending().is_some());
}

#[test]
fn destroying_a_window_releases_everything_in_flight() {
    // The compositor never answers, so nothing resolves.
    let (mut sim, mut pacer, w) = connect(SimConfig {
        max_frames: Some(0),
        ..SimConfig::default()
    });

    pacer.idle_pass(&mut sim).unwrap();
    for target in [1_000, 2_000] {
        pacer.schedule(w, target).unwrap();
        pacer.idle_pass(&mut sim).unwrap();
    }
    assert_eq!(pacer.window(w).unwrap().in_flight(), 3);

    assert_eq!(pacer.destroy_window(w, &mut sim).unwrap(), 3);
    sim.flush().unwrap();

    assert_eq!(sim.stats().released, 3);
    assert_eq!(sim.stats().commits, 3);
    assert!(pacer.window(w).is_none());
    assert!(!pacer.has_pending_redraw());
}

#[test]
fn double_schedule_overwrites_once() {
    let (mut sim, mut pacer, w) = connect(SimConfig::default());
    pacer.idle_pass(&mut sim).unwrap();

    assert_eq!(pacer.schedule(w, 5_000).unwrap(), None);
    assert_eq!(pacer.schedule(w, 7_000).unwrap(), Some(5_000));

    let state = pacer.window(w).unwrap();
    assert_eq!(state.scheduler().overwritten(), 1);
    assert_eq!(state.scheduler().pending(), Some(7_000));
}

#[test]
fn first_sync_output_wins() {
    let (mut sim, mut pacer, w) = connect(SimConfig {
        outputs: 2,
        ..SimConfig::default()
    });
    pacer.idle_pass(&mut sim).unwrap();
    let s = first_submission(&pacer, w);
    let clock = sim.clock();
    clock.advance(16_000_000);

    pacer
        .handle(Event::Frame {
            window: w,
            submission: s,
            event: FrameEvent::Done { callback_data: 0 },
        })
        .unwrap();
    for output in [OutputId(11), OutputId(10)] {
        pacer
            .handle(Event::Feedback {
                window: w,
                submission: s,
                event: FeedbackEvent::SyncOutput(output),
            })
            .unwrap();
    }

    let sync = pacer.window(w).unwrap().submissions().next().unwrap().sync_output().cloned();
    assert_eq!(sync.unwrap().upgrade().unwrap().borrow().id(), OutputId(11));

    // No measured period: the sync output's mode decides.
    let presented = FeedbackEvent::presented(clock.now(), 0, 1, PresentFlags::VSYNC);
    pacer
        .handle(Event::Feedback {
            window: w,
            submission: s,
            event: presented,
        })
        .unwrap();
    assert_eq!(
        pacer.window(w).unwrap().scheduler().pending(),
        Some(16_000_000 + PERIOD_60HZ)
    );

    let err = pacer
        .handle(Event::Feedback {
            window: w,
            submission: s,
            event: presented,
        })
        .unwrap_err();
    assert!(err.is_contract_violation());
}

#[test]
fn presentation_before_the_epoch_uses_current_time() {
    let (mut sim, mut pacer, w) = connect(SimConfig::default());
    pacer.idle_pass(&mut sim).unwrap();
    let s = first_submission(&pacer, w);
    sim.clock().advance(4_000_000);

    for event in [
        Event::Frame {
            window: w,
            submission: s,
            event: FrameEvent::Done { callback_data: 0 },
        },
        Event::Feedback {
            window: w,
            submission: s,
            event: FeedbackEvent::presented(Timestamp::new(10, 0), 16_666_666, 1, PresentFlags::VSYNC),
        },
    ] {
        pacer.handle(event).unwrap();
    }

    assert_eq!(
        pacer.window(w).unwrap().scheduler().pending(),
        Some(4_000_000 + PERIOD_60HZ)
    );
}

#[test]
fn feedback_before_frame_ready_is_rejected() {
    let (mut sim, mut pacer, w) = connect(SimConfig::default());
    pacer.idle_pass(&mut sim).unwrap();
    let s = first_submission(&pacer, w);

    let err = pacer
        .handle(Event::Feedback {
            window: w,
            submission: s,
            event: FeedbackEvent::Discarded,
        })
        .unwrap_err();
    assert!(matches!(err, PacingError::Protocol(_)));
}

#[test]
fn unplugged_sync_output_falls_back_to_a_live_output() {
    let (mut sim, mut pacer, w) = connect(SimConfig {
        outputs: 2,
        report_refresh: false,
        max_frames: Some(3),
        ..SimConfig::default()
    });
    // Frames keep syncing to output 11 after the registry dropped it.
    sim.remove_output(OutputId(11));

    let exit = run_loop(&mut pacer, &mut sim, &CancelToken::new()).unwrap();

    assert_eq!(exit, LoopExit::Hangup);
    assert_eq!(pacer.globals().outputs().len(), 1);
    assert!(pacer.window(w).unwrap().overlapped_outputs().is_empty());

    let presented = pacer.clock().value_now().unwrap();
    assert_eq!(last_target(&pacer, w), presented + PERIOD_60HZ);
}

#[test]
fn late_output_events_after_unplug_are_ignored() {
    let (mut sim, mut pacer, _) = connect(SimConfig {
        outputs: 2,
        max_frames: Some(2),
        ..SimConfig::default()
    });
    sim.remove_output(OutputId(10));
    sim.inject(Event::Output {
        output: OutputId(10),
        event: OutputEvent::Done,
    });

    let exit = run_loop(&mut pacer, &mut sim, &CancelToken::new()).unwrap();

    assert_eq!(exit, LoopExit::Hangup);
    assert_eq!(sim.stats().presented, 2);
    assert!(pacer.globals().outputs().get(OutputId(10)).is_none());
}

#[test]
fn output_readvertised_under_the_same_name_can_be_entered_again() {
    let (_, mut pacer, w) = connect(SimConfig::default());
    let enter = Event::Surface {
        window: w,
        event: SurfaceEvent::Enter(OutputId(10)),
    };

    pacer.handle(enter.clone()).unwrap();
    pacer
        .handle(Event::Registry(RegistryEvent::GlobalRemove { name: 10 }))
        .unwrap();
    assert!(pacer.window(w).unwrap().overlapped_outputs().is_empty());

    pacer
        .handle(Event::Registry(RegistryEvent::Global {
            name: 10,
            interface: Interface::Output.name().to_string(),
            version: 2,
        }))
        .unwrap();
    pacer.handle(enter).unwrap();
    assert_eq!(pacer.window(w).unwrap().overlapped_outputs(), vec![OutputId(10)]);
}

#[test]
fn shutdown_leaves_no_outputs_referenced() {
    let (mut sim, mut pacer, w, _) = run(SimConfig {
        max_frames: Some(2),
        ..SimConfig::default()
    });

    assert_eq!(pacer.shutdown(&mut sim).unwrap(), 0);
    sim.flush().unwrap();
    assert!(pacer.window(w).is_none());
    assert_eq!(sim.stats().released, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn steady_cadence_tracks_any_refresh_rate(refresh_mhz in 30_000i32..=240_000, frames in 1u64..8) {
        let (sim, pacer, w, exit) = run(SimConfig {
            refresh_mhz,
            max_frames: Some(frames),
            ..SimConfig::default()
        });

        prop_assert_eq!(exit, LoopExit::Hangup);
        prop_assert_eq!(sim.stats().presented, frames);

        let state = pacer.window(w).unwrap();
        prop_assert_eq!(state.scheduler().overwritten(), 0);
        let presented = pacer.clock().value_now().unwrap();
        prop_assert_eq!(
            state.submissions().next().unwrap().target_time(),
            presented + sim.period_ns()
        );
    }
}
