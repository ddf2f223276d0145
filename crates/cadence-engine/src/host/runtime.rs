use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Window};

use crate::pacing::{apply_global_event, Pacer, PacerConfig, Released, SubmissionId};
use crate::protocol::{DisplayGlobals, Event, FrameEvent, WindowId};
use crate::runtime::{CancelToken, Requests};
use crate::time::SystemClock;

use super::gpu::{Gpu, GpuInit, SurfaceErrorAction};
use super::outputs::{monitor_events, MonitorInfo};
use super::surface::choose_present_mode;

/// How often the host wakes to look at the cancellation token while idle.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Window host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub title: String,
    pub size: LogicalSize<f64>,
    pub fullscreen: bool,
    pub opaque: bool,
    /// Framebuffer depth: 32 or 16 bits per pixel.
    pub buffer_bits: u32,
    pub vsync: bool,
    pub pacer: PacerConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            title: "cadence".to_string(),
            size: LogicalSize::new(250.0, 250.0),
            fullscreen: false,
            opaque: false,
            buffer_bits: 32,
            vsync: true,
            pacer: PacerConfig::default(),
        }
    }
}

impl HostConfig {
    pub fn gpu_init(&self) -> GpuInit {
        GpuInit {
            buffer_bits: self.buffer_bits,
            opaque: self.opaque,
            present_mode: choose_present_mode(self.vsync),
            ..GpuInit::default()
        }
    }
}

/// Entry point for the windowed host.
pub struct Host;

impl Host {
    /// Opens one window and paces its redraws until closed or cancelled.
    pub fn run(config: HostConfig, cancel: CancelToken) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = HostState::new(config, cancel);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

struct Session {
    pacer: Pacer<SystemClock>,
    window: WindowId,
    entry: WindowEntry,
}

struct HostState {
    config: HostConfig,
    cancel: CancelToken,
    session: Option<Session>,
    error: Option<anyhow::Error>,
}

/// Requests issued during one idle pass, executed against the window's GPU surface.
///
/// There is no presentation feedback here; a presented frame counts as frame-ready.
struct FrameRequests<'a, 'w> {
    window: &'a Window,
    gpu: &'a mut Gpu<'w>,
    opaque: bool,
    pending: Vec<(WindowId, SubmissionId)>,
    ready: Vec<(WindowId, SubmissionId)>,
}

impl Requests for FrameRequests<'_, '_> {
    fn create_surface(&mut self, _window: WindowId) -> io::Result<()> {
        Ok(())
    }

    fn request_frame(&mut self, window: WindowId, submission: SubmissionId) -> io::Result<()> {
        self.pending.push((window, submission));
        Ok(())
    }

    fn request_feedback(&mut self, _window: WindowId, _submission: SubmissionId) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "presentation feedback is not available in a windowed host",
        ))
    }

    fn commit(&mut self, window: WindowId, submission: SubmissionId, target_time: u64) -> io::Result<()> {
        let color = target_color(target_time, self.opaque);
        let result = self
            .gpu
            .clear_and_present(color, || self.window.pre_present_notify());

        match result {
            Ok(()) => {}
            Err(SurfaceErrorAction::Fatal) => {
                return Err(io::Error::other("surface ran out of memory"));
            }
            Err(action) => log::debug!("frame {submission} not shown: {action:?}"),
        }

        // Acknowledged either way so pacing keeps going.
        let key = (window, submission);
        if let Some(idx) = self.pending.iter().position(|k| *k == key) {
            self.ready.push(self.pending.remove(idx));
        }
        Ok(())
    }

    fn release(&mut self, _window: WindowId, _submission: SubmissionId, _handles: Released) -> io::Result<()> {
        Ok(())
    }

    fn destroy_surface(&mut self, _window: WindowId) -> io::Result<()> {
        Ok(())
    }
}

/// Teardown needs no GPU work.
struct NoRequests;

impl Requests for NoRequests {
    fn create_surface(&mut self, _window: WindowId) -> io::Result<()> {
        Ok(())
    }

    fn request_frame(&mut self, _window: WindowId, _submission: SubmissionId) -> io::Result<()> {
        Ok(())
    }

    fn request_feedback(&mut self, _window: WindowId, _submission: SubmissionId) -> io::Result<()> {
        Ok(())
    }

    fn commit(&mut self, _window: WindowId, _submission: SubmissionId, _target_time: u64) -> io::Result<()> {
        Ok(())
    }

    fn release(&mut self, _window: WindowId, _submission: SubmissionId, _handles: Released) -> io::Result<()> {
        Ok(())
    }

    fn destroy_surface(&mut self, _window: WindowId) -> io::Result<()> {
        Ok(())
    }
}

/// Background colour cycling with the target time, one cycle every two seconds.
fn target_color(target_time: u64, opaque: bool) -> wgpu::Color {
    const CYCLE_NS: u64 = 2_000_000_000;
    let phase = (target_time % CYCLE_NS) as f64 / CYCLE_NS as f64;
    let angle = phase * std::f64::consts::TAU;
    let third = std::f64::consts::TAU / 3.0;

    wgpu::Color {
        r: 0.5 + 0.5 * angle.sin(),
        g: 0.5 + 0.5 * (angle + third).sin(),
        b: 0.5 + 0.5 * (angle + 2.0 * third).sin(),
        a: if opaque { 1.0 } else { 0.5 },
    }
}

impl HostState {
    fn new(config: HostConfig, cancel: CancelToken) -> Self {
        Self {
            config,
            cancel,
            session: None,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.error.get_or_insert(err);
        event_loop.exit();
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitors: Vec<MonitorInfo> = event_loop
            .available_monitors()
            .map(|m| MonitorInfo::from_handle(&m))
            .collect();

        let mut globals = DisplayGlobals::new();
        for event in monitor_events(&monitors) {
            apply_global_event(&mut globals, event)?;
        }
        let mut pacer = Pacer::from_globals(globals, SystemClock, self.config.pacer.clone())?;

        let mut attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.size)
            .with_transparent(!self.config.opaque);
        if self.config.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = self.config.gpu_init();
        let entry = WindowEntryTryBuilder {
            window,
            gpu_builder: |w| pollster::block_on(Gpu::new(w, gpu_init)),
        }
        .try_build()?;

        let id = pacer.create_window(&mut NoRequests)?;
        entry.with_window(|w| w.request_redraw());

        self.session = Some(Session {
            pacer,
            window: id,
            entry,
        });
        Ok(())
    }

    /// Runs one idle pass and feeds the frames it presented back as frame-ready.
    fn redraw(&mut self) -> Result<()> {
        let opaque = self.config.opaque;
        let Some(Session { pacer, entry, .. }) = self.session.as_mut() else {
            return Ok(());
        };

        let ready = entry.with_mut(|fields| -> Result<Vec<(WindowId, SubmissionId)>> {
            let mut requests = FrameRequests {
                window: fields.window,
                gpu: fields.gpu,
                opaque,
                pending: Vec::new(),
                ready: Vec::new(),
            };
            pacer.idle_pass(&mut requests)?;
            Ok(requests.ready)
        })?;

        for (window, submission) in ready {
            pacer.handle(Event::Frame {
                window,
                submission,
                event: FrameEvent::Done { callback_data: 0 },
            })?;
        }
        Ok(())
    }

    fn set_suspended(&mut self, suspended: bool) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let pacer = &mut session.pacer;

        if suspended && !pacer.clock().is_frozen() {
            pacer.suspend()?;
        } else if !suspended && pacer.clock().is_frozen() {
            pacer.resume()?;
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        match session.pacer.shutdown(&mut NoRequests) {
            Ok(0) => {}
            Ok(leaked) => log::warn!("{leaked} outputs leaked at shutdown"),
            Err(err) => log::error!("shutdown failed: {err:#}"),
        }
        log::debug!("window {} closed", session.window);
    }

    fn toggle_fullscreen(&self) {
        if let Some(session) = &self.session {
            session.entry.with_window(|w| {
                let next = match w.fullscreen() {
                    Some(_) => None,
                    None => Some(Fullscreen::Borderless(None)),
                };
                w.set_fullscreen(next);
            });
        }
    }
}

impl ApplicationHandler for HostState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() {
            if let Err(err) = self.set_suspended(false) {
                self.fail(event_loop, err);
            }
            return;
        }

        if let Err(err) = self.start(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn suspended(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.set_suspended(true) {
            self.fail(event_loop, err);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            log::info!("cancelled");
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + CANCEL_POLL));

        if let Some(session) = &self.session {
            if session.pacer.has_pending_redraw() {
                session.entry.with_window(|w| w.request_redraw());
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let result = match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
                Ok(())
            }

            WindowEvent::Resized(new_size) => {
                if let Some(session) = self.session.as_mut() {
                    session.entry.with_gpu_mut(|gpu| gpu.resize(new_size));
                }
                Ok(())
            }

            WindowEvent::Occluded(occluded) => self.set_suspended(occluded),

            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => self.cancel.cancel(),
                    PhysicalKey::Code(KeyCode::F11) => self.toggle_fullscreen(),
                    _ => {}
                }
                Ok(())
            }

            WindowEvent::RedrawRequested => self.redraw(),

            _ => Ok(()),
        };

        if let Err(err) = result {
            self.fail(event_loop, err);
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_cycles_every_two_seconds() {
        let a = target_color(250_000_000, true);
        let b = target_color(2_250_000_000, true);
        assert!((a.r - b.r).abs() < 1e-9);
        assert!((a.g - b.g).abs() < 1e-9);
        assert_eq!(a.a, 1.0);
        assert_eq!(target_color(0, false).a, 0.5);
    }

    #[test]
    fn host_config_maps_to_gpu_init() {
        let config = HostConfig {
            opaque: true,
            buffer_bits: 16,
            vsync: false,
            ..HostConfig::default()
        };
        let init = config.gpu_init();
        assert!(init.opaque);
        assert_eq!(init.buffer_bits, 16);
        assert_eq!(init.present_mode, wgpu::PresentMode::AutoNoVsync);
    }
}
