use std::fmt;

use crate::error::{CaptureError, Result};

use super::publisher::TextureHandle;

/// Which framebuffer a snapshot was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Color,
    Depth,
}

impl BufferKind {
    /// Scalars per pixel in the raw readback
    pub const fn channels(self) -> usize {
        match self {
            BufferKind::Color => 4,
            BufferKind::Depth => 1,
        }
    }
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Color => write!(f, "color"),
            BufferKind::Depth => write!(f, "depth"),
        }
    }
}

/// Raw readback of one GPU buffer, row-major, top row first
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub kind: BufferKind,
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl FrameSnapshot {
    pub fn new(kind: BufferKind, width: u32, height: u32, data: Vec<f32>) -> Self {
        Self {
            kind,
            width,
            height,
            channels: kind.channels(),
            data,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Check the snapshot against the size the capture step expects
    pub fn check(&self, width: u32, height: u32) -> std::result::Result<(), CaptureError> {
        if self.width != width || self.height != height {
            return Err(CaptureError::SizeMismatch {
                kind: self.kind,
                expected_width: width,
                expected_height: height,
                actual_width: self.width,
                actual_height: self.height,
            });
        }
        self.check_layout()
    }

    /// Channel count and data length agree with the declared dimensions
    pub fn check_layout(&self) -> std::result::Result<(), CaptureError> {
        if self.channels != self.kind.channels() {
            return Err(CaptureError::ChannelMismatch {
                kind: self.kind,
                expected: self.kind.channels(),
                actual: self.channels,
            });
        }
        let expected = self.pixel_count() * self.channels;
        if self.data.len() != expected {
            return Err(CaptureError::Truncated {
                kind: self.kind,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Snapshot values rescaled into [0, 1] by that snapshot's own min/max
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPixels {
    pub kind: BufferKind,
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl NormalizedPixels {
    pub fn from_snapshot(snapshot: FrameSnapshot) -> Self {
        let FrameSnapshot {
            kind,
            width,
            height,
            channels,
            mut data,
        } = snapshot;
        normalize_in_place(&mut data);
        Self {
            kind,
            width,
            height,
            channels,
            data,
        }
    }

    /// Value at (x, y, channel)
    pub fn get(&self, x: u32, y: u32, channel: usize) -> f32 {
        let idx = (y as usize * self.width as usize + x as usize) * self.channels + channel;
        self.data[idx]
    }
}

/// Finite min and max of a buffer, ignoring NaN and infinities
pub fn finite_range(values: &[f32]) -> Option<(f32, f32)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |range, v| match range {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Rescale every value to `(x - min) / (max - min)` using this buffer's range.
///
/// The range is per call: nothing carries over between frames, so a frame keeps
/// full contrast but absolute depth is not comparable across frames.
/// A uniform buffer (or one with no finite values) becomes all zeros, and
/// non-finite inputs map to zero.
pub fn normalize_in_place(values: &mut [f32]) {
    let Some((min, max)) = finite_range(values) else {
        values.fill(0.0);
        return;
    };

    let span = max - min;
    if span <= 0.0 || !span.is_finite() {
        values.fill(0.0);
        return;
    }

    for v in values.iter_mut() {
        *v = if v.is_finite() {
            ((*v - min) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
}

/// Source of framebuffer readbacks and destination of re-uploaded textures
pub trait Framebuffers {
    /// Read one buffer back at full f32 precision
    fn read_framebuffer(&mut self, kind: BufferKind) -> Result<FrameSnapshot>;

    /// Upload a composed RGBA texture to the GPU and return its handle
    fn upload_texture(&mut self, kind: BufferKind, texture: &RgbaTexture) -> Result<TextureHandle>;
}

/// Read a buffer, verify its shape, and normalize it into [0, 1]
pub fn capture_buffer<F: Framebuffers + ?Sized>(
    framebuffers: &mut F,
    kind: BufferKind,
    width: u32,
    height: u32,
) -> Result<NormalizedPixels> {
    let snapshot = framebuffers.read_framebuffer(kind)?;
    if snapshot.kind != kind {
        return Err(CaptureError::ChannelMismatch {
            kind,
            expected: kind.channels(),
            actual: snapshot.channels,
        }
        .into());
    }
    snapshot.check(width, height)?;
    Ok(NormalizedPixels::from_snapshot(snapshot))
}

/// Four-channel float texture with logical shape (height, width, 4)
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaTexture {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl RgbaTexture {
    /// All channels zero
    pub fn zeroed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize * 4],
        }
    }

    /// Depth layout: G and B zero, A one, R filled in per frame
    pub fn depth_target(width: u32, height: u32) -> Self {
        let mut texture = Self::zeroed(width, height);
        for pixel in texture.data.chunks_exact_mut(4) {
            pixel[3] = 1.0;
        }
        texture
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// One channel as a row-major plane
    pub fn channel(&self, channel: usize) -> Vec<f32> {
        self.data.chunks_exact(4).map(|p| p[channel]).collect()
    }

    pub fn pixels(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(4)
    }

    fn check_target(&self, source: &NormalizedPixels) -> std::result::Result<(), CaptureError> {
        if source.width != self.width || source.height != self.height {
            return Err(CaptureError::SizeMismatch {
                kind: source.kind,
                expected_width: self.width,
                expected_height: self.height,
                actual_width: source.width,
                actual_height: source.height,
            });
        }
        if source.channels != source.kind.channels() {
            return Err(CaptureError::ChannelMismatch {
                kind: source.kind,
                expected: source.kind.channels(),
                actual: source.channels,
            });
        }
        let expected = self.width as usize * self.height as usize * source.channels;
        if source.data.len() != expected {
            return Err(CaptureError::Truncated {
                kind: source.kind,
                expected,
                actual: source.data.len(),
            });
        }
        Ok(())
    }
}

/// Copy RGB and derive a binary alpha: 0 where R, G and B are all <= 0, else 1
pub fn compose_color_texture(
    color: &NormalizedPixels,
    target: &mut RgbaTexture,
) -> std::result::Result<(), CaptureError> {
    target.check_target(color)?;

    for (dst, src) in target.data.chunks_exact_mut(4).zip(color.data.chunks_exact(4)) {
        dst[..3].copy_from_slice(&src[..3]);
        let background = src[..3].iter().all(|&c| c <= 0.0);
        dst[3] = if background { 0.0 } else { 1.0 };
    }
    Ok(())
}

/// Write depth into the red channel; G, B and A are left as allocated
pub fn compose_depth_texture(
    depth: &NormalizedPixels,
    target: &mut RgbaTexture,
) -> std::result::Result<(), CaptureError> {
    target.check_target(depth)?;

    for (dst, &d) in target.data.chunks_exact_mut(4).zip(depth.data.iter()) {
        dst[0] = d;
    }
    Ok(())
}

/// The two publish textures, allocated once and rewritten every frame
#[derive(Debug, Clone)]
pub struct FrameCapture {
    width: u32,
    height: u32,
    color: RgbaTexture,
    depth: RgbaTexture,
}

impl FrameCapture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color: RgbaTexture::zeroed(width, height),
            depth: RgbaTexture::depth_target(width, height),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Reallocate both textures for a new framebuffer size
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        log::info!(
            "Reallocating capture textures {}x{} -> {}x{}",
            self.width,
            self.height,
            width,
            height
        );
        *self = Self::new(width, height);
    }

    pub fn compose_color(
        &mut self,
        color: &NormalizedPixels,
    ) -> std::result::Result<&RgbaTexture, CaptureError> {
        compose_color_texture(color, &mut self.color)?;
        Ok(&self.color)
    }

    pub fn compose_depth(
        &mut self,
        depth: &NormalizedPixels,
    ) -> std::result::Result<&RgbaTexture, CaptureError> {
        compose_depth_texture(depth, &mut self.depth)?;
        Ok(&self.depth)
    }

    pub fn texture(&self, kind: BufferKind) -> &RgbaTexture {
        match kind {
            BufferKind::Color => &self.color,
            BufferKind::Depth => &self.depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(kind: BufferKind, width: u32, height: u32, data: Vec<f32>) -> NormalizedPixels {
        NormalizedPixels::from_snapshot(FrameSnapshot::new(kind, width, height, data))
    }

    #[test]
    fn normalize_maps_extremes_to_unit_range() {
        let mut values = vec![2.0, 4.0, 6.0];
        normalize_in_place(&mut values);
        assert_eq!(values, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn normalize_uniform_buffer_is_zero() {
        let mut values = vec![0.7; 16];
        normalize_in_place(&mut values);
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn normalize_ignores_non_finite() {
        let mut values = vec![f32::NAN, 1.0, f32::INFINITY, 3.0];
        normalize_in_place(&mut values);
        assert_eq!(values, vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn normalize_all_nan_is_zero() {
        let mut values = vec![f32::NAN; 4];
        normalize_in_place(&mut values);
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn finite_range_of_empty_is_none() {
        assert_eq!(finite_range(&[]), None);
        assert_eq!(finite_range(&[1.0, -2.0, 5.0]), Some((-2.0, 5.0)));
    }

    #[test]
    fn depth_target_starts_opaque_black() {
        let tex = RgbaTexture::depth_target(3, 2);
        for pixel in tex.pixels() {
            assert_eq!(pixel, &[0.0, 0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn compose_depth_only_touches_red() {
        let mut tex = RgbaTexture::depth_target(2, 1);
        let depth = normalized(BufferKind::Depth, 2, 1, vec![3.0, 7.0]);
        compose_depth_texture(&depth, &mut tex).unwrap();
        assert_eq!(tex.pixel(0, 0), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(tex.pixel(1, 0), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn compose_color_alpha_is_binary() {
        let mut tex = RgbaTexture::zeroed(3, 1);
        let color = normalized(
            BufferKind::Color,
            3,
            1,
            vec![0.0, 0.0, 0.0, 1.0, 0.1, 0.0, 0.0, 1.0, 0.5, 0.5, 0.5, 0.3],
        );
        compose_color_texture(&color, &mut tex).unwrap();
        assert_eq!(tex.pixel(0, 0)[3], 0.0);
        assert_eq!(tex.pixel(1, 0)[3], 1.0);
        assert_eq!(tex.pixel(2, 0)[3], 1.0);
    }

    #[test]
    fn compose_rejects_wrong_size() {
        let mut tex = RgbaTexture::zeroed(4, 4);
        let color = normalized(BufferKind::Color, 2, 2, vec![0.5; 16]);
        let err = compose_color_texture(&color, &mut tex).unwrap_err();
        assert!(matches!(err, CaptureError::SizeMismatch { actual_width: 2, .. }));
    }

    #[test]
    fn snapshot_check_detects_short_data() {
        let snapshot = FrameSnapshot::new(BufferKind::Depth, 2, 2, vec![0.0; 3]);
        assert!(matches!(
            snapshot.check(2, 2),
            Err(CaptureError::Truncated { expected: 4, actual: 3, .. })
        ));
    }

    #[test]
    fn frame_capture_resize_reinitializes_depth_alpha() {
        let mut capture = FrameCapture::new(2, 2);
        capture.resize(3, 1);
        assert_eq!(capture.dimensions(), (3, 1));
        let depth = capture.texture(BufferKind::Depth);
        assert_eq!(depth.dimensions(), (3, 1));
        assert!(depth.pixels().all(|p| p[3] == 1.0));
    }

    #[test]
    fn buffer_kind_channels() {
        assert_eq!(BufferKind::Color.channels(), 4);
        assert_eq!(BufferKind::Depth.channels(), 1);
        assert_eq!(BufferKind::Depth.to_string(), "depth");
    }
}
