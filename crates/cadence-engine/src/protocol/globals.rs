use std::collections::{HashMap, HashSet};

use crate::error::{ProtocolViolation, SetupError};
use crate::output::{OutputId, OutputRegistry};
use crate::time::ClockId;

use super::events::{Interface, OutputEvent, PresentationEvent, RegistryEvent};

/// Where the logical clock gets its physical readings from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClockSource {
    /// Presentation timestamps, in the clock the compositor announced.
    Presentation(ClockId),
    /// No presentation support: frame callbacks on the monotonic clock.
    FrameCallback,
    /// Presentation is bound but never announced its clock.
    Unannounced,
}

impl ClockSource {
    pub fn clock_id(self) -> ClockId {
        match self {
            ClockSource::Presentation(id) => id,
            ClockSource::FrameCallback | ClockSource::Unannounced => ClockId::MONOTONIC,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ClockSource::Presentation(_) => "Presentation extension",
            ClockSource::FrameCallback => "frame callback",
            ClockSource::Unannounced => "frame callback (presentation clock not received)",
        }
    }
}

/// Registry state: which globals are bound, the outputs, and the presentation clock.
#[derive(Debug)]
pub struct DisplayGlobals {
    /// Registry name of each bound singleton.
    singletons: HashMap<Interface, u32>,
    outputs: OutputRegistry,
    /// Outputs the compositor withdrew; late events for them are dropped.
    removed: HashSet<OutputId>,
    clock_id: ClockId,
}

impl Default for DisplayGlobals {
    fn default() -> Self {
        Self {
            singletons: HashMap::new(),
            outputs: OutputRegistry::new(),
            removed: HashSet::new(),
            clock_id: ClockId::INVALID,
        }
    }
}

impl DisplayGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self, interface: Interface) -> bool {
        self.singletons.contains_key(&interface)
    }

    pub fn has_presentation(&self) -> bool {
        self.is_bound(Interface::Presentation)
    }

    pub fn announced_clock(&self) -> ClockId {
        self.clock_id
    }

    pub fn outputs(&self) -> &OutputRegistry {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut OutputRegistry {
        &mut self.outputs
    }

    pub fn handle_registry(&mut self, event: RegistryEvent) -> Result<(), ProtocolViolation> {
        match event {
            RegistryEvent::Global {
                name,
                interface,
                version,
            } => self.bind(name, &interface, version),
            RegistryEvent::GlobalRemove { name } => {
                if self.outputs.remove(OutputId(name)).is_some() {
                    self.removed.insert(OutputId(name));
                    log::info!("output-{name} removed by the compositor");
                }
                Ok(())
            }
        }
    }

    /// Applies an output event. Events still in flight for a removed output are ignored.
    pub fn handle_output(&mut self, id: OutputId, event: OutputEvent) -> Result<(), ProtocolViolation> {
        if self.outputs.get(id).is_none() && self.removed.contains(&id) {
            log::debug!("event for removed output-{id} ignored");
            return Ok(());
        }
        self.outputs.apply(id, event)
    }

    pub fn handle_presentation(&mut self, event: PresentationEvent) {
        match event {
            PresentationEvent::ClockId(id) => self.clock_id = ClockId(id),
        }
    }

    fn bind(&mut self, name: u32, interface: &str, version: u32) -> Result<(), ProtocolViolation> {
        let Some(iface) = Interface::from_name(interface) else {
            log::trace!("ignoring global '{interface}' (name {name})");
            return Ok(());
        };

        if version < iface.min_version() {
            log::warn!(
                "failed to bind '{interface}' (name {name}): version {version} is below {}",
                iface.min_version()
            );
            return Ok(());
        }

        if iface.is_singleton() {
            if self.singletons.insert(iface, name).is_some() {
                return Err(ProtocolViolation::DuplicateGlobal(iface));
            }
        } else {
            self.outputs.add(OutputId(name))?;
            self.removed.remove(&OutputId(name));
        }

        log::debug!("bound '{interface}' (name {name}, version {version})");
        Ok(())
    }

    /// Checks that startup can proceed and picks the clock source.
    pub fn finish(&self) -> Result<ClockSource, SetupError> {
        for required in [Interface::Compositor, Interface::Shell] {
            if !self.is_bound(required) {
                return Err(SetupError::MissingGlobal(required));
            }
        }

        if self.outputs.is_empty() {
            return Err(SetupError::NoOutputs);
        }

        let source = if !self.has_presentation() {
            log::warn!("presentation feedback unavailable, timings will suffer");
            ClockSource::FrameCallback
        } else if !self.clock_id.is_valid() {
            log::warn!("presentation clock id not received, falling back to the monotonic clock");
            ClockSource::Unannounced
        } else {
            ClockSource::Presentation(self.clock_id)
        };

        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(name: u32, interface: Interface) -> RegistryEvent {
        RegistryEvent::Global {
            name,
            interface: interface.name().to_string(),
            version: interface.min_version(),
        }
    }

    fn basic() -> DisplayGlobals {
        let mut g = DisplayGlobals::new();
        g.handle_registry(global(1, Interface::Compositor)).unwrap();
        g.handle_registry(global(2, Interface::Shell)).unwrap();
        g.handle_registry(global(10, Interface::Output)).unwrap();
        g
    }

    #[test]
    fn finish_without_presentation_uses_frame_callbacks() {
        let g = basic();
        assert_eq!(g.finish(), Ok(ClockSource::FrameCallback));
        assert_eq!(ClockSource::FrameCallback.clock_id(), ClockId::MONOTONIC);
    }

    #[test]
    fn announced_clock_is_used() {
        let mut g = basic();
        g.handle_registry(global(3, Interface::Presentation)).unwrap();
        g.handle_presentation(PresentationEvent::ClockId(ClockId::MONOTONIC_RAW.0));
        assert_eq!(
            g.finish(),
            Ok(ClockSource::Presentation(ClockId::MONOTONIC_RAW))
        );
    }

    #[test]
    fn unannounced_clock_degrades_to_monotonic() {
        let mut g = basic();
        g.handle_registry(global(3, Interface::Presentation)).unwrap();
        let source = g.finish().unwrap();
        assert_eq!(source, ClockSource::Unannounced);
        assert_eq!(source.clock_id(), ClockId::MONOTONIC);
    }

    #[test]
    fn missing_compositor_or_outputs_is_fatal() {
        let g = DisplayGlobals::new();
        assert_eq!(
            g.finish(),
            Err(SetupError::MissingGlobal(Interface::Compositor))
        );

        let mut g = DisplayGlobals::new();
        g.handle_registry(global(1, Interface::Compositor)).unwrap();
        g.handle_registry(global(2, Interface::Shell)).unwrap();
        assert_eq!(g.finish(), Err(SetupError::NoOutputs));
    }

    #[test]
    fn duplicate_singleton_is_a_violation() {
        let mut g = basic();
        let err = g.handle_registry(global(7, Interface::Shell)).unwrap_err();
        assert_eq!(err, ProtocolViolation::DuplicateGlobal(Interface::Shell));
    }

    #[test]
    fn old_outputs_and_unknown_globals_are_skipped() {
        let mut g = DisplayGlobals::new();
        g.handle_registry(RegistryEvent::Global {
            name: 5,
            interface: "wl_output".into(),
            version: 1,
        })
        .unwrap();
        g.handle_registry(RegistryEvent::Global {
            name: 6,
            interface: "zwp_linux_dmabuf_v1".into(),
            version: 4,
        })
        .unwrap();
        assert!(g.outputs().is_empty());
    }

    #[test]
    fn late_events_for_removed_outputs_are_ignored() {
        let mut g = basic();
        g.handle_registry(RegistryEvent::GlobalRemove { name: 10 }).unwrap();
        assert_eq!(g.handle_output(OutputId(10), OutputEvent::Done), Ok(()));
        assert_eq!(
            g.handle_output(OutputId(42), OutputEvent::Done),
            Err(ProtocolViolation::UnknownOutput(OutputId(42)))
        );
    }

    #[test]
    fn global_remove_drops_output() {
        let mut g = basic();
        g.handle_registry(global(11, Interface::Output)).unwrap();
        g.handle_registry(RegistryEvent::GlobalRemove { name: 10 }).unwrap();
        assert_eq!(g.outputs().len(), 1);
        assert!(g.outputs().get(OutputId(11)).is_some());
    }
}
