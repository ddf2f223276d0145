use winit::monitor::MonitorHandle;

use crate::output::{ModeFlags, OutputId};
use crate::protocol::{Event, Interface, OutputEvent, RegistryEvent};

/// Registry name of the first monitor.
const FIRST_OUTPUT: u32 = 10;

/// What the windowing system tells us about one monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorInfo {
    pub name: Option<String>,
    pub size: (u32, u32),
    pub refresh_mhz: Option<u32>,
    /// `(width, height, refresh_mhz)` per advertised video mode.
    pub modes: Vec<(u32, u32, u32)>,
    pub scale_factor: f64,
}

impl MonitorInfo {
    pub fn from_handle(monitor: &MonitorHandle) -> Self {
        let size = monitor.size();
        Self {
            name: monitor.name(),
            size: (size.width, size.height),
            refresh_mhz: monitor.refresh_rate_millihertz(),
            modes: monitor
                .video_modes()
                .map(|m| (m.size().width, m.size().height, m.refresh_rate_millihertz()))
                .collect(),
            scale_factor: monitor.scale_factor(),
        }
    }
}

/// Registry and output events describing a windowing system with these monitors.
///
/// A windowed host always has a compositor and a shell; it never has presentation feedback.
pub fn monitor_events(monitors: &[MonitorInfo]) -> Vec<Event> {
    let mut events = Vec::new();

    for (name, interface) in [(1, Interface::Compositor), (2, Interface::Shell)] {
        events.push(Event::Registry(RegistryEvent::Global {
            name,
            interface: interface.name().to_string(),
            version: interface.min_version(),
        }));
    }

    for (i, monitor) in monitors.iter().enumerate() {
        let output = OutputId(FIRST_OUTPUT + i as u32);
        events.push(Event::Registry(RegistryEvent::Global {
            name: output.0,
            interface: Interface::Output.name().to_string(),
            version: Interface::Output.min_version(),
        }));

        let mut batch = vec![OutputEvent::Geometry {
            mm_width: 0,
            mm_height: 0,
            make: monitor.name.clone().unwrap_or_else(|| "unknown".to_string()),
            model: String::new(),
            transform: 0,
        }];
        batch.extend(mode_events(monitor));
        batch.push(OutputEvent::Scale(monitor.scale_factor.round().max(1.0) as i32));
        batch.push(OutputEvent::Done);

        events.extend(batch.into_iter().map(|event| Event::Output { output, event }));
    }

    events
}

/// The current mode is the first one matching the monitor's size and refresh rate.
fn mode_events(monitor: &MonitorInfo) -> Vec<OutputEvent> {
    let mut current_seen = false;
    let mut events: Vec<OutputEvent> = monitor
        .modes
        .iter()
        .map(|&(width, height, refresh_mhz)| {
            let is_current = !current_seen
                && (width, height) == monitor.size
                && Some(refresh_mhz) == monitor.refresh_mhz;
            current_seen |= is_current;

            OutputEvent::Mode {
                flags: if is_current { ModeFlags::CURRENT } else { ModeFlags::default() },
                width: width as i32,
                height: height as i32,
                refresh_mhz: refresh_mhz as i32,
            }
        })
        .collect();

    if !current_seen {
        if let Some(refresh_mhz) = monitor.refresh_mhz {
            events.push(OutputEvent::Mode {
                flags: ModeFlags::CURRENT,
                width: monitor.size.0 as i32,
                height: monitor.size.1 as i32,
                refresh_mhz: refresh_mhz as i32,
            });
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DisplayGlobals;
    use crate::pacing::apply_global_event;

    fn monitor(refresh_mhz: Option<u32>, modes: Vec<(u32, u32, u32)>) -> MonitorInfo {
        MonitorInfo {
            name: Some("DP-1".to_string()),
            size: (2560, 1440),
            refresh_mhz,
            modes,
            scale_factor: 1.25,
        }
    }

    fn build(monitors: &[MonitorInfo]) -> DisplayGlobals {
        let mut g = DisplayGlobals::new();
        for ev in monitor_events(monitors) {
            apply_global_event(&mut g, ev).unwrap();
        }
        g
    }

    #[test]
    fn matching_mode_becomes_current() {
        let g = build(&[monitor(
            Some(143_912),
            vec![(1920, 1080, 60_000), (2560, 1440, 143_912), (2560, 1440, 59_951)],
        )]);
        let out = g.outputs().chosen().unwrap().borrow();
        assert_eq!(out.modes().len(), 3);
        assert_eq!(out.current_mode().unwrap().refresh_mhz, 143_912);
        assert!(out.is_done());
        assert_eq!(out.make(), "DP-1");
    }

    #[test]
    fn refresh_without_matching_mode_is_synthesized() {
        let g = build(&[monitor(Some(75_000), vec![])]);
        let out = g.outputs().chosen().unwrap().borrow();
        assert_eq!(out.refresh_period_ns(), Some(13_333_333));
    }

    #[test]
    fn unknown_refresh_leaves_no_current_mode() {
        let g = build(&[monitor(None, vec![(800, 600, 60_000)])]);
        let out = g.outputs().chosen().unwrap().borrow();
        assert!(out.current_mode().is_none());
    }

    #[test]
    fn host_setup_uses_frame_callbacks() {
        let g = build(&[monitor(Some(60_000), vec![]), monitor(Some(60_000), vec![])]);
        assert_eq!(g.outputs().len(), 2);
        assert_eq!(g.finish(), Ok(crate::protocol::ClockSource::FrameCallback));
    }
}
