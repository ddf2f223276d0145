use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::ProtocolViolation;
use crate::protocol::{Interface, OutputEvent};

use super::model::{OutputId, OutputModel, Transform};

/// Owning handle to an output. Only the registry keeps one long-term.
pub type OutputHandle = Rc<RefCell<OutputModel>>;

/// Non-owning link held by windows and submissions.
///
/// A link never keeps an output alive past its removal from the registry.
pub type OutputLink = Weak<RefCell<OutputModel>>;

/// Refresh period behind a link, `None` if the output is gone or has no current mode.
pub fn link_refresh_period(link: &OutputLink) -> Option<u64> {
    link.upgrade()?.borrow().refresh_period_ns()
}

/// Single owner of every known output, in discovery order.
#[derive(Debug, Default)]
pub struct OutputRegistry {
    outputs: Vec<OutputHandle>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputHandle> {
        self.outputs.iter()
    }

    pub fn get(&self, id: OutputId) -> Option<&OutputHandle> {
        self.outputs.iter().find(|o| o.borrow().id() == id)
    }

    pub fn link(&self, id: OutputId) -> Option<OutputLink> {
        self.get(id).map(Rc::downgrade)
    }

    /// Registers a newly advertised output.
    pub fn add(&mut self, id: OutputId) -> Result<OutputLink, ProtocolViolation> {
        if self.get(id).is_some() {
            return Err(ProtocolViolation::DuplicateGlobal(Interface::Output));
        }

        let handle = Rc::new(RefCell::new(OutputModel::new(id)));
        let link = Rc::downgrade(&handle);
        self.outputs.push(handle);
        Ok(link)
    }

    /// Drops the registry's ownership of an output; outstanding links stop resolving.
    pub fn remove(&mut self, id: OutputId) -> Option<OutputHandle> {
        let idx = self.outputs.iter().position(|o| o.borrow().id() == id)?;
        Some(self.outputs.remove(idx))
    }

    /// The output a fresh window is expected to land on: the last one discovered.
    pub fn chosen(&self) -> Option<&OutputHandle> {
        self.outputs.last()
    }

    /// Applies one output event to the addressed output.
    pub fn apply(&mut self, id: OutputId, event: OutputEvent) -> Result<(), ProtocolViolation> {
        let handle = self.get(id).ok_or(ProtocolViolation::UnknownOutput(id))?;
        let mut output = handle.borrow_mut();

        match event {
            OutputEvent::Geometry {
                mm_width,
                mm_height,
                make,
                model,
                transform,
            } => output.set_geometry(mm_width, mm_height, make, model, Transform::from_raw(transform)),
            OutputEvent::Mode {
                flags,
                width,
                height,
                refresh_mhz,
            } => output.apply_mode(flags, width, height, refresh_mhz),
            OutputEvent::Done => output.mark_done(),
            OutputEvent::Scale(factor) => output.set_scale(factor),
        }

        Ok(())
    }

    /// Logs one line per output.
    pub fn log_summary(&self) {
        log::info!("found {} outputs:", self.outputs.len());
        for o in &self.outputs {
            log::info!("\t{}", o.borrow().summary());
        }
    }

    /// Releases every output, returning how many were still shared elsewhere.
    pub fn release_all(&mut self) -> usize {
        let mut leaked = 0;
        for handle in self.outputs.drain(..) {
            if Rc::strong_count(&handle) > 1 {
                log::warn!("output-{} leaked", handle.borrow().id());
                leaked += 1;
            }
        }
        leaked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ModeFlags;

    fn mode(refresh_mhz: i32) -> OutputEvent {
        OutputEvent::Mode {
            flags: ModeFlags::CURRENT,
            width: 1920,
            height: 1080,
            refresh_mhz,
        }
    }

    #[test]
    fn events_reach_the_addressed_output() {
        let mut reg = OutputRegistry::new();
        reg.add(OutputId(1)).unwrap();
        reg.add(OutputId(2)).unwrap();

        reg.apply(OutputId(2), mode(75_000)).unwrap();
        reg.apply(OutputId(2), OutputEvent::Scale(2)).unwrap();
        reg.apply(OutputId(2), OutputEvent::Done).unwrap();

        let two = reg.get(OutputId(2)).unwrap().borrow();
        assert_eq!(two.refresh_period_ns(), Some(13_333_333));
        assert_eq!(two.scale(), 2);
        assert!(two.is_done());
        assert!(!reg.get(OutputId(1)).unwrap().borrow().is_done());
    }

    #[test]
    fn unknown_and_duplicate_outputs_are_violations() {
        let mut reg = OutputRegistry::new();
        reg.add(OutputId(1)).unwrap();
        assert_eq!(
            reg.add(OutputId(1)).unwrap_err(),
            ProtocolViolation::DuplicateGlobal(Interface::Output)
        );
        assert_eq!(
            reg.apply(OutputId(9), OutputEvent::Done).unwrap_err(),
            ProtocolViolation::UnknownOutput(OutputId(9))
        );
    }

    #[test]
    fn links_do_not_outlive_removal() {
        let mut reg = OutputRegistry::new();
        let link = reg.add(OutputId(4)).unwrap();
        reg.apply(OutputId(4), mode(60_000)).unwrap();
        assert_eq!(link_refresh_period(&link), Some(16_666_666));

        let removed = reg.remove(OutputId(4)).unwrap();
        drop(removed);
        assert!(link.upgrade().is_none());
        assert_eq!(link_refresh_period(&link), None);
    }

    #[test]
    fn chosen_is_last_discovered() {
        let mut reg = OutputRegistry::new();
        assert!(reg.chosen().is_none());
        reg.add(OutputId(3)).unwrap();
        reg.add(OutputId(8)).unwrap();
        assert_eq!(reg.chosen().unwrap().borrow().id(), OutputId(8));
    }

    #[test]
    fn release_counts_shared_handles() {
        let mut reg = OutputRegistry::new();
        reg.add(OutputId(1)).unwrap();
        reg.add(OutputId(2)).unwrap();
        let held = Rc::clone(reg.get(OutputId(2)).unwrap());

        assert_eq!(reg.release_all(), 1);
        assert!(reg.is_empty());
        drop(held);
    }
}
