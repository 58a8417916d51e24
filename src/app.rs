use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use crate::camera::OrbitCamera;
use crate::config::BridgeConfig;
use crate::core::capture::{BufferKind, FrameSnapshot, Framebuffers, RgbaTexture};
use crate::core::controller::Button;
use crate::core::gpu_context::GpuContext;
use crate::core::input_adapter::WinitController;
use crate::core::publish_loop::FrameHost;
use crate::core::publisher::TextureHandle;
use crate::core::timer::Throttled;
use crate::dataset::ScalarVolume;
use crate::error::{BridgeError, Result};
use crate::presenter::{OverlayStats, SurfacePresenter};
use crate::renderer::VolumeRenderer;

const FPS_UPDATE_INTERVAL: f32 = 1.0;
/// Pumps allowed for the platform to deliver `resumed` and a first window
const STARTUP_PUMPS: usize = 200;
const STARTUP_PUMP_TIMEOUT: Duration = Duration::from_millis(10);
/// Radians the headless camera turns per frame
const TURNTABLE_STEP: f32 = 0.02;

/// Frames-per-second counter for the overlay
#[derive(Debug, Clone, Copy)]
struct FpsCounter {
    timer: Throttled,
    frames: u32,
    last: Option<Instant>,
    fps: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            timer: Throttled::new(FPS_UPDATE_INTERVAL),
            frames: 0,
            last: None,
            fps: 0.0,
        }
    }

    fn frame(&mut self, now: Instant) -> f32 {
        self.frames += 1;
        let delta = self.last.map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last = Some(now);

        if let Some(window) = self.timer.try_tick(delta) {
            self.fps = self.frames as f32 / window;
            self.frames = 0;
        }
        self.fps
    }
}

/// Window-side GPU state, created once the platform resumes us
struct View {
    renderer: VolumeRenderer,
    presenter: SurfacePresenter,
}

/// winit application: one fixed-size window showing the volume
pub struct ViewerApp {
    config: BridgeConfig,
    volume: ScalarVolume,
    camera: OrbitCamera,
    controller: WinitController,
    view: Option<View>,
    init_error: Option<BridgeError>,
    closed: bool,
    snapshot_requested: bool,
    fps: FpsCounter,
    frames_rendered: u64,
}

impl ViewerApp {
    pub fn new(config: BridgeConfig, volume: ScalarVolume) -> Self {
        Self {
            controller: WinitController::new(config.width, config.height),
            config,
            volume,
            camera: OrbitCamera::looking_at_volume(),
            view: None,
            init_error: None,
            closed: false,
            snapshot_requested: false,
            fps: FpsCounter::new(),
            frames_rendered: 0,
        }
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    fn create_view(&self, window: Arc<Window>) -> Result<View> {
        let (gpu, surface, adapter) = pollster::block_on(GpuContext::for_window(window.clone()))?;
        let size = window.inner_size();

        let renderer = VolumeRenderer::new(
            gpu.clone(),
            &self.volume,
            size.width,
            size.height,
            self.config.ray_steps,
            self.config.opacity_scale,
        )?;
        let presenter = SurfacePresenter::new(
            &gpu,
            window,
            surface,
            &adapter,
            renderer.color_view(),
            self.config.show_ui,
        )?;

        Ok(View { renderer, presenter })
    }

    /// Fold this pump's input into camera and requests
    fn after_events(&mut self) {
        if self.controller.close_requested() {
            log::info!("Closing window");
            self.closed = true;
        }
        if self.controller.was_pressed(Button::KeyP) {
            self.snapshot_requested = true;
        }

        if let Some(drag) = self.controller.take_drag() {
            self.camera
                .update_orientation(drag.start.0, drag.start.1, drag.end.0, drag.end.1);
        }
        let scroll = self.controller.take_scroll();
        if scroll != 0.0 {
            self.camera.zoom(scroll);
        }
        self.camera.pan(&self.controller);

        self.controller.reset_deltas();
    }

    fn draw(&mut self) -> Result<()> {
        let Some(view) = self.view.as_mut() else {
            return Err(BridgeError::gpu("Draw requested before the window was created"));
        };

        view.renderer.render(&self.camera);
        self.frames_rendered += 1;
        let fps = self.fps.frame(Instant::now());

        let stats = OverlayStats {
            fps,
            field: view.renderer.field(),
            camera: self.camera.position(),
            resolution: view.renderer.size(),
            ray_steps: view.renderer.ray_steps(),
            frames_rendered: self.frames_rendered,
            color_sender: &self.config.color_sender,
            depth_sender: &self.config.depth_sender,
        };
        let gpu = view.renderer.gpu().clone();
        view.presenter.present(&gpu, &stats)
    }

    fn renderer(&mut self) -> Result<&mut VolumeRenderer> {
        self.view
            .as_mut()
            .map(|view| &mut view.renderer)
            .ok_or_else(|| BridgeError::gpu("No renderer: the window was never created"))
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.view.is_some() || self.init_error.is_some() {
            return;
        }

        let window = match event_loop.create_window(
            Window::default_attributes()
                .with_title("Volume Bridge")
                .with_resizable(false)
                .with_inner_size(winit::dpi::PhysicalSize::new(self.config.width, self.config.height)),
        ) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.init_error = Some(BridgeError::gpu(format!("Failed to create window: {e}")));
                event_loop.exit();
                return;
            }
        };

        match self.create_view(window) {
            Ok(view) => {
                let (width, height) = view.renderer.size();
                self.controller.set_viewport(width, height);
                log::info!("Window ready at {}x{}", width, height);
                self.view = Some(view);
            }
            Err(e) => {
                self.init_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let Some(view) = self.view.as_mut() {
            let consumed = view.presenter.handle_event(&event);
            self.controller.set_pointer_captured(consumed || view.presenter.wants_pointer());
        }
        self.controller.process_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                self.closed = true;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                // Fixed-size window, but a scale factor change still lands here
                if let Some(view) = self.view.as_mut() {
                    let gpu = view.renderer.gpu().clone();
                    if let Err(e) = view.renderer.resize(size.width, size.height) {
                        log::error!("Keeping {:?} render targets: {}", view.renderer.size(), e);
                        return;
                    }
                    view.presenter.resize(&gpu, size.width, size.height);
                    view.presenter.set_source(&gpu, view.renderer.color_view());
                    self.controller.set_viewport(size.width, size.height);
                }
            }
            _ => {}
        }
    }
}

/// Interactive host: a winit window pumped once per publish tick
pub struct WindowedHost {
    event_loop: EventLoop<()>,
    app: ViewerApp,
    exited: bool,
}

impl WindowedHost {
    /// Create the event loop and pump it until the window and renderer exist
    pub fn new(config: BridgeConfig, volume: ScalarVolume) -> Result<Self> {
        let mut event_loop =
            EventLoop::new().map_err(|e| BridgeError::gpu(format!("Failed to create event loop: {e}")))?;
        let mut app = ViewerApp::new(config, volume);

        for _ in 0..STARTUP_PUMPS {
            if let PumpStatus::Exit(_) = event_loop.pump_app_events(Some(STARTUP_PUMP_TIMEOUT), &mut app) {
                break;
            }
            if app.view.is_some() || app.init_error.is_some() {
                break;
            }
        }

        if let Some(e) = app.init_error.take() {
            return Err(e);
        }
        if app.view.is_none() {
            return Err(BridgeError::gpu("Window was not created during startup"));
        }

        Ok(Self {
            event_loop,
            app,
            exited: false,
        })
    }
}

impl FrameHost for WindowedHost {
    fn has_open_windows(&self) -> bool {
        !self.exited && !self.app.closed && self.app.view.is_some()
    }

    fn pump_events(&mut self) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.app) {
            log::debug!("Event loop exited with code {}", code);
            self.exited = true;
        }
        self.app.after_events();
    }

    fn draw(&mut self) -> Result<()> {
        self.app.draw()
    }

    fn camera_position(&self) -> Vec3 {
        self.app.camera().position()
    }

    fn take_snapshot_request(&mut self) -> bool {
        std::mem::take(&mut self.app.snapshot_requested)
    }
}

impl Framebuffers for WindowedHost {
    fn read_framebuffer(&mut self, kind: BufferKind) -> Result<FrameSnapshot> {
        self.app.renderer()?.read_framebuffer(kind)
    }

    fn upload_texture(&mut self, kind: BufferKind, texture: &RgbaTexture) -> Result<TextureHandle> {
        self.app.renderer()?.upload_texture(kind, texture)
    }
}

/// Offscreen host: renders a turntable orbit for a fixed number of frames
pub struct HeadlessHost {
    renderer: VolumeRenderer,
    camera: OrbitCamera,
    frames_remaining: u64,
    snapshot_last: bool,
}

impl HeadlessHost {
    pub fn new(config: &BridgeConfig, volume: &ScalarVolume, frames: u64) -> Result<Self> {
        let gpu = pollster::block_on(GpuContext::headless())?;
        let renderer = VolumeRenderer::new(
            gpu,
            volume,
            config.width,
            config.height,
            config.ray_steps,
            config.opacity_scale,
        )?;

        log::info!("Rendering {} frames offscreen", frames);
        Ok(Self {
            renderer,
            camera: OrbitCamera::looking_at_volume(),
            frames_remaining: frames,
            snapshot_last: false,
        })
    }

    /// Save a snapshot of the final frame
    pub fn with_final_snapshot(mut self, enabled: bool) -> Self {
        self.snapshot_last = enabled;
        self
    }
}

impl FrameHost for HeadlessHost {
    fn has_open_windows(&self) -> bool {
        self.frames_remaining > 0
    }

    fn pump_events(&mut self) {}

    fn draw(&mut self) -> Result<()> {
        self.renderer.render(&self.camera);
        self.camera.orbit_yaw(TURNTABLE_STEP);
        self.frames_remaining = self.frames_remaining.saturating_sub(1);
        Ok(())
    }

    fn camera_position(&self) -> Vec3 {
        self.camera.position()
    }

    fn take_snapshot_request(&mut self) -> bool {
        self.snapshot_last && self.frames_remaining == 0
    }
}

impl Framebuffers for HeadlessHost {
    fn read_framebuffer(&mut self, kind: BufferKind) -> Result<FrameSnapshot> {
        self.renderer.read_framebuffer(kind)
    }

    fn upload_texture(&mut self, kind: BufferKind, texture: &RgbaTexture) -> Result<TextureHandle> {
        self.renderer.upload_texture(kind, texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_counter_reports_after_interval() {
        let mut fps = FpsCounter::new();
        let start = Instant::now();

        assert_eq!(fps.frame(start), 0.0);
        for i in 1..=33 {
            fps.frame(start + Duration::from_millis(i * 1000 / 30));
        }
        assert!((fps.fps - 30.0).abs() < 1.5, "fps was {}", fps.fps);
    }
}
