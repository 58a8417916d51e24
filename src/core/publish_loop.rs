use std::path::PathBuf;
use std::time::{Duration, Instant};

use glam::Vec3;

use crate::config::{BridgeConfig, SizeMismatchPolicy};
use crate::error::{BridgeError, CaptureError, Result};
use crate::snapshot;

use super::capture::{capture_buffer, BufferKind, FrameCapture, Framebuffers, NormalizedPixels};
use super::publisher::{PublishChannel, TexturePublisher};
use super::timer::{FramePacer, Throttled};

const STATS_INTERVAL: f32 = 1.0;

/// Window and event-loop side of a tick
pub trait FrameHost {
    /// False once every window is closed or an exit was requested
    fn has_open_windows(&self) -> bool;

    /// Dispatch pending window and input events
    fn pump_events(&mut self);

    /// Render the scene; the only place the scene advances
    fn draw(&mut self) -> Result<()>;

    fn camera_position(&self) -> Vec3;

    /// Whether a snapshot of this frame was asked for since the last call
    fn take_snapshot_request(&mut self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Published,
    Skipped,
}

/// Drives draw, capture and publish once per tick at a bounded rate
pub struct PublishLoop<P: TexturePublisher> {
    capture: FrameCapture,
    depth: PublishChannel<P>,
    color: PublishChannel<P>,
    flip_vertically: bool,
    size_mismatch: SizeMismatchPolicy,
    snapshot_dir: PathBuf,
    pacer: FramePacer,
    stats: Throttled,
    last_tick: Option<Instant>,
    published: u64,
    skipped: u64,
    window_frames: u64,
    state: LoopState,
}

impl<P: TexturePublisher> PublishLoop<P> {
    /// Both channels must already carry their sender names
    pub fn new(config: &BridgeConfig, depth: PublishChannel<P>, color: PublishChannel<P>) -> Result<Self> {
        let pacer = FramePacer::new(config.target_fps)?;
        Ok(Self {
            capture: FrameCapture::new(config.width, config.height),
            depth,
            color,
            flip_vertically: config.flip_vertically,
            size_mismatch: config.size_mismatch,
            snapshot_dir: config.snapshot_dir.clone(),
            pacer,
            stats: Throttled::new(STATS_INTERVAL),
            last_tick: None,
            published: 0,
            skipped: 0,
            window_frames: 0,
            state: LoopState::Running,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn published_frames(&self) -> u64 {
        self.published
    }

    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }

    pub fn capture(&self) -> &FrameCapture {
        &self.capture
    }

    /// Run ticks until the host has no open windows.
    ///
    /// `sleep` is the only place the loop yields; it receives what is left of
    /// the frame period after the tick's work.
    pub fn run<H, S>(&mut self, host: &mut H, mut sleep: S) -> Result<()>
    where
        H: FrameHost + Framebuffers,
        S: FnMut(Duration),
    {
        loop {
            match self.tick(host, Instant::now()) {
                Ok(LoopState::Running) => sleep(self.pacer.remaining(Instant::now())),
                Ok(LoopState::Stopped) => return Ok(()),
                Err(e) => {
                    self.stop();
                    return Err(e);
                }
            }
        }
    }

    /// One pass: events, draw, depth publish, color publish
    pub fn tick<H>(&mut self, host: &mut H, now: Instant) -> Result<LoopState>
    where
        H: FrameHost + Framebuffers,
    {
        if self.state == LoopState::Stopped {
            return Ok(LoopState::Stopped);
        }
        if !host.has_open_windows() {
            self.stop();
            return Ok(LoopState::Stopped);
        }

        self.pacer.begin_tick(now);
        host.pump_events();
        if !host.has_open_windows() {
            self.stop();
            return Ok(LoopState::Stopped);
        }

        host.draw()?;
        let camera = host.camera_position();
        log::trace!("Camera at ({:.3}, {:.3}, {:.3})", camera.x, camera.y, camera.z);

        let snapshot_requested = host.take_snapshot_request();
        let outcome = self.publish_frame(host)?;
        if snapshot_requested && outcome == FrameOutcome::Published {
            self.save_snapshot();
        }

        self.record_stats(now);
        Ok(LoopState::Running)
    }

    /// Capture and publish depth, then color
    pub fn publish_frame<F: Framebuffers + ?Sized>(&mut self, framebuffers: &mut F) -> Result<FrameOutcome> {
        for kind in [BufferKind::Depth, BufferKind::Color] {
            if !self.publish_buffer(framebuffers, kind)? {
                self.skipped += 1;
                return Ok(FrameOutcome::Skipped);
            }
        }
        self.published += 1;
        Ok(FrameOutcome::Published)
    }

    /// Returns false when the frame was skipped over a size mismatch
    fn publish_buffer<F: Framebuffers + ?Sized>(&mut self, framebuffers: &mut F, kind: BufferKind) -> Result<bool> {
        let Some(normalized) = self.capture_checked(framebuffers, kind)? else {
            return Ok(false);
        };

        let texture = match kind {
            BufferKind::Depth => self.capture.compose_depth(&normalized)?,
            BufferKind::Color => self.capture.compose_color(&normalized)?,
        };
        let handle = framebuffers.upload_texture(kind, texture)?;

        let channel = match kind {
            BufferKind::Depth => &mut self.depth,
            BufferKind::Color => &mut self.color,
        };
        channel.publish(handle, texture, self.flip_vertically)?;
        Ok(true)
    }

    fn capture_checked<F: Framebuffers + ?Sized>(
        &mut self,
        framebuffers: &mut F,
        kind: BufferKind,
    ) -> Result<Option<NormalizedPixels>> {
        let (width, height) = self.capture.dimensions();
        match capture_buffer(framebuffers, kind, width, height) {
            Ok(normalized) => Ok(Some(normalized)),
            Err(BridgeError::Capture(CaptureError::SizeMismatch {
                actual_width,
                actual_height,
                ..
            })) => match self.size_mismatch {
                SizeMismatchPolicy::Reallocate => {
                    self.capture.resize(actual_width, actual_height);
                    capture_buffer(framebuffers, kind, actual_width, actual_height).map(Some)
                }
                SizeMismatchPolicy::SkipFrame => {
                    log::warn!(
                        "Skipping frame: {} buffer is {}x{}, publishing at {}x{}",
                        kind,
                        actual_width,
                        actual_height,
                        width,
                        height
                    );
                    Ok(None)
                }
            },
            Err(e) => Err(e),
        }
    }

    fn save_snapshot(&self) {
        let color = self.capture.texture(BufferKind::Color);
        let depth = self.capture.texture(BufferKind::Depth);
        match snapshot::save_pair(&self.snapshot_dir, color, depth, self.flip_vertically) {
            Ok((color_path, depth_path)) => log::info!(
                "Saved snapshot {} and {}",
                color_path.display(),
                depth_path.display()
            ),
            Err(e) => log::warn!("Snapshot failed: {}", e),
        }
    }

    fn record_stats(&mut self, now: Instant) {
        self.window_frames += 1;
        let delta = self
            .last_tick
            .map(|last| now.duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        if let Some(window) = self.stats.try_tick(delta) {
            log::info!(
                "Published {} frames ({:.1} fps), {} skipped total",
                self.published,
                self.window_frames as f32 / window,
                self.skipped
            );
            self.window_frames = 0;
        }
    }

    /// Stop ticking and release both channels
    pub fn stop(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        self.state = LoopState::Stopped;
        log::info!("Publish loop stopped after {} frames", self.published);

        for channel in [&mut self.depth, &mut self.color] {
            if let Err(e) = channel.release() {
                log::warn!("Failed to release '{}': {}", channel.name(), e);
            }
        }
    }
}
