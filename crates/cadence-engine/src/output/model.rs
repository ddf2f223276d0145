use std::fmt;

use bitflags::bitflags;

use crate::time::millihz_to_nsec;

/// Registry name of an output global; stable for the output's lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub u32);

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Mode flags as sent with each mode event.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct ModeFlags: u32 {
        const CURRENT = 0x1;
        const PREFERRED = 0x2;
    }
}

/// One advertised video mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VideoMode {
    pub flags: ModeFlags,
    pub width: i32,
    pub height: i32,
    /// Refresh rate in Hz × 1000; zero or negative when unknown.
    pub refresh_mhz: i32,
}

/// Output content transform.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Transform {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

impl Transform {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Rotate90,
            2 => Self::Rotate180,
            3 => Self::Rotate270,
            4 => Self::Flipped,
            5 => Self::Flipped90,
            6 => Self::Flipped180,
            7 => Self::Flipped270,
            _ => Self::Normal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Rotate90 => "90",
            Self::Rotate180 => "180",
            Self::Rotate270 => "270",
            Self::Flipped => "flipped",
            Self::Flipped90 => "flipped-90",
            Self::Flipped180 => "flipped-180",
            Self::Flipped270 => "flipped-270",
        }
    }
}

/// One display as described by its output events.
#[derive(Debug, Clone)]
pub struct OutputModel {
    id: OutputId,
    make: String,
    model: String,
    mm_width: i32,
    mm_height: i32,
    transform: Transform,
    scale: i32,

    modes: Vec<VideoMode>,
    /// Index into `modes` of the latest mode flagged current.
    current: Option<usize>,

    done: bool,
}

impl OutputModel {
    pub fn new(id: OutputId) -> Self {
        Self {
            id,
            make: String::new(),
            model: String::new(),
            mm_width: 0,
            mm_height: 0,
            transform: Transform::Normal,
            scale: 1,
            modes: Vec::new(),
            current: None,
            done: false,
        }
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn set_geometry(
        &mut self,
        mm_width: i32,
        mm_height: i32,
        make: impl Into<String>,
        model: impl Into<String>,
        transform: Transform,
    ) {
        self.mm_width = mm_width;
        self.mm_height = mm_height;
        self.make = make.into();
        self.model = model.into();
        self.transform = transform;
    }

    /// Appends a mode; a mode flagged current replaces the current mode.
    pub fn apply_mode(&mut self, flags: ModeFlags, width: i32, height: i32, refresh_mhz: i32) {
        self.modes.push(VideoMode {
            flags,
            width,
            height,
            refresh_mhz,
        });

        if flags.contains(ModeFlags::CURRENT) {
            self.current = Some(self.modes.len() - 1);
        }
    }

    pub fn set_scale(&mut self, factor: i32) {
        self.scale = factor;
    }

    /// Marks the end of an atomic batch of output events.
    pub fn mark_done(&mut self) {
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn modes(&self) -> &[VideoMode] {
        &self.modes
    }

    pub fn current_mode(&self) -> Option<&VideoMode> {
        self.current.map(|i| &self.modes[i])
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    pub fn make(&self) -> &str {
        &self.make
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn physical_size_mm(&self) -> (i32, i32) {
        (self.mm_width, self.mm_height)
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// Refresh period of the current mode, `None` if no usable current mode is known.
    pub fn refresh_period_ns(&self) -> Option<u64> {
        let mode = self.current_mode()?;
        let mhz = u32::try_from(mode.refresh_mhz).ok()?;
        millihz_to_nsec(mhz)
    }

    /// One-line description used in the setup summary.
    pub fn summary(&self) -> String {
        if !self.done {
            return format!("output-{}: error getting output info", self.id);
        }

        let mode = match self.current_mode() {
            Some(m) => format!("{}x{}@{}.{:03}Hz", m.width, m.height, m.refresh_mhz / 1000, m.refresh_mhz % 1000),
            None => "(no mode)".to_string(),
        };

        format!(
            "output-{}: {} {}, scale={}, {}, {}",
            self.id,
            mode,
            self.transform.as_str(),
            self.scale,
            self.make,
            self.model,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn output() -> OutputModel {
        OutputModel::new(OutputId(7))
    }

    #[test]
    fn no_current_mode_has_no_period() {
        let mut o = output();
        assert_eq!(o.refresh_period_ns(), None);
        o.apply_mode(ModeFlags::PREFERRED, 800, 600, 60_000);
        assert_eq!(o.current_mode(), None);
        assert_eq!(o.refresh_period_ns(), None);
    }

    #[test]
    fn latest_current_mode_wins() {
        let mut o = output();
        o.apply_mode(ModeFlags::CURRENT, 1920, 1080, 60_000);
        o.apply_mode(ModeFlags::empty(), 1280, 720, 75_000);
        o.apply_mode(ModeFlags::CURRENT | ModeFlags::PREFERRED, 2560, 1440, 144_000);

        assert_eq!(o.modes().len(), 3);
        assert_eq!(o.current_mode().map(|m| m.width), Some(2560));
        assert_eq!(o.refresh_period_ns(), Some(6_944_444));
    }

    #[test]
    fn nonpositive_refresh_has_no_period() {
        let mut o = output();
        o.apply_mode(ModeFlags::CURRENT, 640, 480, 0);
        assert_eq!(o.refresh_period_ns(), None);
        o.apply_mode(ModeFlags::CURRENT, 640, 480, -1);
        assert_eq!(o.refresh_period_ns(), None);
    }

    #[test]
    fn summary_before_done_reports_missing_info() {
        let mut o = output();
        assert!(o.summary().contains("error getting output info"));
        o.set_geometry(300, 200, "ACME", "Panel", Transform::from_raw(1));
        o.apply_mode(ModeFlags::CURRENT, 1024, 768, 59_940);
        o.mark_done();
        assert_eq!(
            o.summary(),
            "output-7: 1024x768@59.940Hz 90, scale=1, ACME, Panel"
        );
    }

    proptest! {
        #[test]
        fn period_round_trips_within_truncation(mhz in 1_000u32..1_000_000) {
            let mut o = output();
            o.apply_mode(ModeFlags::CURRENT, 1, 1, mhz as i32);
            let period = o.refresh_period_ns().unwrap();
            let product = period * mhz as u64;
            prop_assert!(product <= 1_000_000_000_000);
            prop_assert!(1_000_000_000_000 - product < mhz as u64);
        }
    }
}
