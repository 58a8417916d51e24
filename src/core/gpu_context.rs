use std::sync::Arc;
use wgpu::{Adapter, Buffer, Device, DeviceDescriptor, Features, Instance, Limits, Queue, Surface, Texture};
use winit::window::Window;

use crate::error::{BridgeError, Result};

/// Row pitch of a texture-to-buffer copy, padded to wgpu's alignment
pub fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Drop the per-row padding of a readback and reinterpret it as f32
pub fn unpad_rows(padded: &[u8], width: u32, height: u32, bytes_per_pixel: u32) -> Vec<f32> {
    let row = (width * bytes_per_pixel) as usize;
    let pitch = padded_bytes_per_row(width, bytes_per_pixel) as usize;

    let mut out = Vec::with_capacity(row / 4 * height as usize);
    for chunk in padded.chunks(pitch).take(height as usize) {
        out.extend(bytemuck::pod_collect_to_vec::<u8, f32>(&chunk[..row]));
    }
    out
}

/// Device and queue shared by the renderer, the readback path and the presenter
#[derive(Clone)]
pub struct GpuContext {
    device: Arc<Device>,
    queue: Arc<Queue>,
}

impl GpuContext {
    /// Create a context without a surface (for offscreen rendering)
    pub async fn headless() -> Result<Self> {
        let instance = Self::instance();
        let adapter = Self::request_adapter(&instance, None).await?;
        let (device, queue) = Self::request_device(&adapter).await?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Create a context and a surface for `window` from the same instance
    pub async fn for_window(window: Arc<Window>) -> Result<(Self, Surface<'static>, Adapter)> {
        let instance = Self::instance();
        let surface = instance
            .create_surface(window)
            .map_err(|e| BridgeError::gpu(format!("Failed to create surface: {e}")))?;

        let adapter = Self::request_adapter(&instance, Some(&surface)).await?;
        let (device, queue) = Self::request_device(&adapter).await?;

        Ok((
            Self {
                device: Arc::new(device),
                queue: Arc::new(queue),
            },
            surface,
            adapter,
        ))
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Copy a float texture into `staging` and read it back.
    ///
    /// Blocks until the GPU has finished every submitted command. `staging`
    /// must be `MAP_READ | COPY_DST` and at least
    /// `padded_bytes_per_row(width, bpp) * height` bytes.
    pub fn read_texture_f32(
        &self,
        texture: &Texture,
        staging: &Buffer,
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
    ) -> Result<Vec<f32>> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });

        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row(width, bytes_per_pixel)),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let padded = self.read_buffer_sync(staging)?;
        Ok(unpad_rows(&padded, width, height, bytes_per_pixel))
    }

    /// Map a buffer and copy its contents out (blocking)
    pub fn read_buffer_sync(&self, buffer: &Buffer) -> Result<Vec<u8>> {
        let buffer_slice = buffer.slice(..);

        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            sender.send(result).ok();
        });

        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| BridgeError::gpu(format!("Device poll failed: {e:?}")))?;

        match pollster::block_on(receiver) {
            Ok(Ok(())) => {
                let data = buffer_slice.get_mapped_range();
                let result = data.to_vec();
                drop(data);
                buffer.unmap();
                Ok(result)
            }
            Ok(Err(e)) => Err(BridgeError::gpu(format!("Buffer mapping failed: {e:?}"))),
            Err(_) => Err(BridgeError::gpu("Mapping callback dropped before completing")),
        }
    }

    fn instance() -> Instance {
        Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        })
    }

    async fn request_adapter(instance: &Instance, surface: Option<&Surface<'_>>) -> Result<Adapter> {
        instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| BridgeError::gpu(format!("Failed to find appropriate adapter: {e:?}")))
    }

    async fn request_device(adapter: &Adapter) -> Result<(Device, Queue)> {
        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        adapter
            .request_device(&DeviceDescriptor {
                label: Some("Volume Bridge Device"),
                required_features: Features::empty(),
                required_limits: Limits::default(),
                memory_hints: Default::default(),
                experimental_features: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| BridgeError::gpu(format!("Failed to create device: {e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_pitch_is_aligned() {
        assert_eq!(padded_bytes_per_row(800, 16), 12800);
        assert_eq!(padded_bytes_per_row(800, 4), 3328);
        assert_eq!(padded_bytes_per_row(1, 4), 256);
        assert_eq!(padded_bytes_per_row(64, 4), 256);
    }

    #[test]
    fn unpad_strips_row_padding() {
        // Two rows of 2 r32float pixels, each padded to 256 bytes
        let mut padded = vec![0u8; 512];
        for (row, values) in [[1.0f32, 2.0], [3.0, 4.0]].iter().enumerate() {
            for (i, v) in values.iter().enumerate() {
                let at = row * 256 + i * 4;
                padded[at..at + 4].copy_from_slice(&v.to_ne_bytes());
            }
        }

        assert_eq!(unpad_rows(&padded, 2, 2, 4), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_clone_semantics() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<GpuContext>();
    }
}
