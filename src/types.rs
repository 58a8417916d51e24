/// Camera uniform buffer data for GPU
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub position: [f32; 3],
    pub tan_half_fov: f32,
    pub forward: [f32; 3],
    pub aspect: f32,
    pub right: [f32; 3],
    pub near: f32,
    pub up: [f32; 3],
    pub far: f32,
}

/// Ray-march parameters for the volume shader
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VolumeParams {
    pub dims: [u32; 3],
    pub steps: u32,
    pub box_min: [f32; 3],
    pub opacity_scale: f32,
    pub box_max: [f32; 3],
    pub _pad: f32,
}

impl VolumeParams {
    /// Box centered on the origin whose longest side is 1, keeping the grid's aspect
    pub fn new(dims: [u32; 3], steps: u32, opacity_scale: f32) -> Self {
        let longest = dims.iter().copied().max().unwrap_or(1).max(1) as f32;
        let half = dims.map(|d| d as f32 / longest * 0.5);

        Self {
            dims,
            steps,
            box_min: half.map(|h| -h),
            opacity_scale,
            box_max: half,
            _pad: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 64);
        assert_eq!(std::mem::size_of::<VolumeParams>(), 48);
    }

    #[test]
    fn volume_box_keeps_aspect() {
        let params = VolumeParams::new([64, 32, 16], 128, 4.0);
        assert_eq!(params.box_max, [0.5, 0.25, 0.125]);
        assert_eq!(params.box_min, [-0.5, -0.25, -0.125]);
    }
}
