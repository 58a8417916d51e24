use std::path::{Path, PathBuf};

use image::{GrayImage, ImageError, RgbaImage};

use crate::core::capture::RgbaTexture;

fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

/// Color texture as an 8-bit RGBA image
pub fn color_image(texture: &RgbaTexture, flip_vertically: bool) -> RgbaImage {
    let (width, height) = texture.dimensions();
    let bytes = texture
        .pixels()
        .flat_map(|p| p.iter().map(|&c| to_u8(c)))
        .collect::<Vec<u8>>();

    let mut img = RgbaImage::from_raw(width, height, bytes)
        .unwrap_or_else(|| RgbaImage::new(width, height));
    if flip_vertically {
        image::imageops::flip_vertical_in_place(&mut img);
    }
    img
}

/// Red channel of the depth texture as an 8-bit grayscale image
pub fn depth_image(texture: &RgbaTexture, flip_vertically: bool) -> GrayImage {
    let (width, height) = texture.dimensions();
    let bytes = texture.pixels().map(|p| to_u8(p[0])).collect::<Vec<u8>>();

    let mut img = GrayImage::from_raw(width, height, bytes)
        .unwrap_or_else(|| GrayImage::new(width, height));
    if flip_vertically {
        image::imageops::flip_vertical_in_place(&mut img);
    }
    img
}

pub fn save_color(path: &Path, texture: &RgbaTexture, flip_vertically: bool) -> Result<(), ImageError> {
    color_image(texture, flip_vertically).save(path)
}

pub fn save_depth(path: &Path, texture: &RgbaTexture, flip_vertically: bool) -> Result<(), ImageError> {
    depth_image(texture, flip_vertically).save(path)
}

/// Write both textures into `dir` under a shared timestamp
pub fn save_pair(
    dir: &Path,
    color: &RgbaTexture,
    depth: &RgbaTexture,
    flip_vertically: bool,
) -> Result<(PathBuf, PathBuf), ImageError> {
    std::fs::create_dir_all(dir)?;

    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
    let color_path = dir.join(format!("color-{stamp}.png"));
    let depth_path = dir.join(format!("depth-{stamp}.png"));

    save_color(&color_path, color, flip_vertically)?;
    save_depth(&depth_path, depth, flip_vertically)?;
    Ok((color_path, depth_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capture::{compose_depth_texture, BufferKind, FrameSnapshot, NormalizedPixels};

    fn depth_texture(values: Vec<f32>, width: u32, height: u32) -> RgbaTexture {
        let mut tex = RgbaTexture::depth_target(width, height);
        let depth = NormalizedPixels::from_snapshot(FrameSnapshot::new(BufferKind::Depth, width, height, values));
        compose_depth_texture(&depth, &mut tex).unwrap();
        tex
    }

    #[test]
    fn depth_image_uses_red_channel() {
        let img = depth_image(&depth_texture(vec![0.0, 10.0], 2, 1), false);
        assert_eq!(img.get_pixel(0, 0).0, [0]);
        assert_eq!(img.get_pixel(1, 0).0, [255]);
    }

    #[test]
    fn flip_swaps_rows() {
        let img = depth_image(&depth_texture(vec![0.0, 10.0], 1, 2), true);
        assert_eq!(img.get_pixel(0, 0).0, [255]);
        assert_eq!(img.get_pixel(0, 1).0, [0]);
    }

    #[test]
    fn color_image_keeps_alpha() {
        let img = color_image(&RgbaTexture::depth_target(1, 1), false);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn save_pair_writes_two_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let color = RgbaTexture::zeroed(4, 4);
        let depth = RgbaTexture::depth_target(4, 4);

        let (color_path, depth_path) = save_pair(dir.path(), &color, &depth, true).unwrap();
        assert!(color_path.exists());
        assert!(depth_path.exists());
        assert_ne!(color_path, depth_path);
    }
}
