use wgpu::util::DeviceExt;

use crate::camera::OrbitCamera;
use crate::core::capture::{BufferKind, FrameSnapshot, Framebuffers, RgbaTexture};
use crate::core::gpu_context::{padded_bytes_per_row, GpuContext};
use crate::core::publisher::TextureHandle;
use crate::dataset::ScalarVolume;
use crate::error::{BridgeError, Result};
use crate::types::VolumeParams;

pub const WORKGROUP_SIZE: u32 = 8;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// Offscreen render targets at one resolution, plus their readback buffers
struct Targets {
    width: u32,
    height: u32,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
    color_staging: wgpu::Buffer,
    depth_staging: wgpu::Buffer,
}

impl Targets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let make = |label, format| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        };
        let staging = |label, bpp| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: padded_bytes_per_row(width, bpp) as u64 * height as u64,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            })
        };

        let color = make("Color Target", COLOR_FORMAT);
        let depth = make("Depth Target", DEPTH_FORMAT);

        Self {
            width,
            height,
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            depth,
            color_staging: staging("Color Staging", bytes_per_pixel(BufferKind::Color)),
            depth_staging: staging("Depth Staging", bytes_per_pixel(BufferKind::Depth)),
        }
    }
}

fn bytes_per_pixel(kind: BufferKind) -> u32 {
    (kind.channels() * std::mem::size_of::<f32>()) as u32
}

/// Reject render sizes the device cannot allocate targets or readback buffers for
pub fn check_target_size(limits: &wgpu::Limits, width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(BridgeError::gpu(format!("Cannot render at {width}x{height}")));
    }

    let max = limits.max_texture_dimension_2d;
    if width > max || height > max {
        return Err(BridgeError::gpu(format!(
            "Render size {width}x{height} exceeds the device limit of {max} pixels per side"
        )));
    }

    let staging = padded_bytes_per_row(width, bytes_per_pixel(BufferKind::Color)) as u64 * height as u64;
    if staging > limits.max_buffer_size {
        return Err(BridgeError::gpu(format!(
            "Render size {width}x{height} needs a {staging} byte readback buffer, device allows {}",
            limits.max_buffer_size
        )));
    }
    Ok(())
}

/// Reject volumes larger than the device's 3D texture limit
pub fn check_volume_size(limits: &wgpu::Limits, dimensions: [u32; 3]) -> Result<()> {
    let max = limits.max_texture_dimension_3d;
    if dimensions.iter().any(|&n| n == 0 || n > max) {
        return Err(BridgeError::gpu(format!(
            "Volume {dimensions:?} does not fit a 3D texture (each side 1..={max})"
        )));
    }
    Ok(())
}

/// Compute ray marcher producing the color and depth framebuffers
pub struct VolumeRenderer {
    gpu: GpuContext,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    camera_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    params: VolumeParams,
    volume_view: wgpu::TextureView,
    field: String,
    targets: Targets,
    /// Published textures, one per buffer kind; recreated on size change
    published: [Option<wgpu::Texture>; 2],
}

impl VolumeRenderer {
    pub fn new(
        gpu: GpuContext,
        volume: &ScalarVolume,
        width: u32,
        height: u32,
        ray_steps: u32,
        opacity_scale: f32,
    ) -> Result<Self> {
        let device = gpu.device();
        let limits = device.limits();
        check_target_size(&limits, width, height)?;
        check_volume_size(&limits, volume.dimensions)?;

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[OrbitCamera::default().to_uniform(width as f32 / height as f32)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let params = VolumeParams::new(volume.dimensions, ray_steps.max(1), opacity_scale);
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Volume Params Buffer"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let volume_view = Self::upload_volume(&gpu, volume);
        let targets = Targets::new(device, width, height);
        let (pipeline, bind_group_layout) = Self::create_compute_pipeline(device);
        let bind_group = Self::create_bind_group(
            device,
            &bind_group_layout,
            &camera_buffer,
            &params_buffer,
            &volume_view,
            &targets,
        );

        log::info!(
            "Volume renderer ready: field '{}' {:?}, {}x{}, {} steps",
            volume.field,
            volume.dimensions,
            width,
            height,
            params.steps
        );

        Ok(Self {
            gpu,
            pipeline,
            bind_group_layout,
            bind_group,
            camera_buffer,
            params_buffer,
            params,
            volume_view,
            field: volume.field.clone(),
            targets,
            published: [None, None],
        })
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn ray_steps(&self) -> u32 {
        self.params.steps
    }

    pub fn size(&self) -> (u32, u32) {
        (self.targets.width, self.targets.height)
    }

    /// The color target, for on-screen display
    pub fn color_view(&self) -> &wgpu::TextureView {
        &self.targets.color_view
    }

    /// Reallocate the render targets; the next readback reports the new size.
    ///
    /// A zero size is ignored. A size beyond the device limits is an error and
    /// keeps the current targets.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 || (width, height) == self.size() {
            return Ok(());
        }
        check_target_size(&self.gpu.device().limits(), width, height)?;
        self.targets = Targets::new(self.gpu.device(), width, height);
        self.rebuild_bind_group();
        log::debug!("Render targets resized to {}x{}", width, height);
        Ok(())
    }

    /// Ray march the volume into the color and depth targets
    pub fn render(&mut self, camera: &OrbitCamera) {
        let aspect = self.targets.width as f32 / self.targets.height as f32;
        self.gpu.queue().write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[camera.to_uniform(aspect)]),
        );

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Volume Encoder"),
            });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Volume Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &self.bind_group, &[]);
            compute_pass.dispatch_workgroups(
                self.targets.width.div_ceil(WORKGROUP_SIZE),
                self.targets.height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }

        self.gpu.queue().submit(std::iter::once(encoder.finish()));
    }

    fn rebuild_bind_group(&mut self) {
        self.bind_group = Self::create_bind_group(
            self.gpu.device(),
            &self.bind_group_layout,
            &self.camera_buffer,
            &self.params_buffer,
            &self.volume_view,
            &self.targets,
        );
    }

    fn upload_volume(gpu: &GpuContext, volume: &ScalarVolume) -> wgpu::TextureView {
        let [nx, ny, nz] = volume.dimensions;
        let size = wgpu::Extent3d {
            width: nx,
            height: ny,
            depth_or_array_layers: nz,
        };
        let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        gpu.queue().write_texture(
            texture.as_image_copy(),
            bytemuck::cast_slice(&volume.data),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(nx * 4),
                rows_per_image: Some(ny),
            },
            size,
        );

        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn create_compute_pipeline(device: &wgpu::Device) -> (wgpu::ComputePipeline, wgpu::BindGroupLayout) {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Volume Compute Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("volume.wgsl").into()),
        });

        let uniform = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let storage = |binding, format| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                uniform(0),
                uniform(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                storage(3, COLOR_FORMAT),
                storage(4, DEPTH_FORMAT),
            ],
            label: Some("volume_bind_group_layout"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Volume Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Volume Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        (pipeline, bind_group_layout)
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        camera_buffer: &wgpu::Buffer,
        params_buffer: &wgpu::Buffer,
        volume_view: &wgpu::TextureView,
        targets: &Targets,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(volume_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&targets.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&targets.depth_view),
                },
            ],
            label: Some("volume_bind_group"),
        })
    }

    fn published_texture(&mut self, kind: BufferKind, width: u32, height: u32) -> &wgpu::Texture {
        let device = self.gpu.device();
        let slot = &mut self.published[texture_slot(kind) as usize];
        if slot.as_ref().is_some_and(|t| t.width() != width || t.height() != height) {
            *slot = None;
        }

        slot.get_or_insert_with(|| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(match kind {
                    BufferKind::Color => "Published Color",
                    BufferKind::Depth => "Published Depth",
                }),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: COLOR_FORMAT,
                usage: wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })
    }
}

/// Fixed texture slot per buffer kind
pub fn texture_slot(kind: BufferKind) -> u32 {
    match kind {
        BufferKind::Depth => 0,
        BufferKind::Color => 1,
    }
}

impl Framebuffers for VolumeRenderer {
    fn read_framebuffer(&mut self, kind: BufferKind) -> Result<FrameSnapshot> {
        let targets = &self.targets;
        let (texture, staging) = match kind {
            BufferKind::Color => (&targets.color, &targets.color_staging),
            BufferKind::Depth => (&targets.depth, &targets.depth_staging),
        };

        let data = self
            .gpu
            .read_texture_f32(texture, staging, targets.width, targets.height, bytes_per_pixel(kind))?;
        Ok(FrameSnapshot::new(kind, targets.width, targets.height, data))
    }

    fn upload_texture(&mut self, kind: BufferKind, texture: &RgbaTexture) -> Result<TextureHandle> {
        let (width, height) = texture.dimensions();
        check_target_size(&self.gpu.device().limits(), width, height)?;
        let gpu = self.gpu.clone();
        let target = self.published_texture(kind, width, height);

        gpu.queue().write_texture(
            target.as_image_copy(),
            texture.as_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * bytes_per_pixel(BufferKind::Color)),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        Ok(TextureHandle {
            kind,
            slot: texture_slot(kind),
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_size_within_limits() {
        let limits = wgpu::Limits::default();
        assert!(check_target_size(&limits, 800, 800).is_ok());
        assert!(check_target_size(&limits, 1920, 1080).is_ok());
    }

    #[test]
    fn target_size_rejects_zero_and_oversized() {
        let limits = wgpu::Limits::default();
        for (w, h) in [(0, 600), (800, 0), (10_000, 600), (600, 10_000)] {
            assert!(
                matches!(check_target_size(&limits, w, h), Err(BridgeError::Gpu(_))),
                "{w}x{h} should be rejected"
            );
        }
    }

    #[test]
    fn target_size_rejects_oversized_readback() {
        let limits = wgpu::Limits {
            max_buffer_size: 1 << 20,
            ..wgpu::Limits::default()
        };
        // 512 rows of 1024 RGBA32F pixels is 8 MiB
        let err = check_target_size(&limits, 1024, 512).unwrap_err();
        assert!(err.to_string().contains("readback"));
    }

    #[test]
    fn volume_size_against_3d_limit() {
        let limits = wgpu::Limits::default();
        let max = limits.max_texture_dimension_3d;

        assert!(check_volume_size(&limits, [64, 64, 64]).is_ok());
        assert!(check_volume_size(&limits, [max, 4, 4]).is_ok());
        for dims in [[max + 1, 4, 4], [4, 4, 4096], [0, 4, 4]] {
            assert!(
                matches!(check_volume_size(&limits, dims), Err(BridgeError::Gpu(_))),
                "{dims:?} should be rejected"
            );
        }
    }

    #[test]
    fn texture_slots_are_fixed() {
        assert_eq!(texture_slot(BufferKind::Depth), 0);
        assert_eq!(texture_slot(BufferKind::Color), 1);
    }
}
