use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::error::PublishError;

use super::capture::{BufferKind, RgbaTexture};

type Result<T> = std::result::Result<T, PublishError>;

/// Shared frame file magic
pub const FRAME_MAGIC: [u8; 4] = *b"VBFR";
pub const FRAME_VERSION: u32 = 1;
pub const FRAME_HEADER_LEN: usize = 32;
/// Header flag: rows were flipped top-to-bottom before writing
pub const FLAG_FLIPPED: u32 = 1;

/// Whether `name` can name a sender's files: one plain file name, no separators
pub fn is_file_safe_sender_name(name: &str) -> bool {
    if name.trim().is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// GPU-side texture a publish refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureHandle {
    pub kind: BufferKind,
    pub slot: u32,
    pub width: u32,
    pub height: u32,
}

/// Sends textures to external listeners
pub trait TexturePublisher {
    /// Name the stream listeners will find this sender under
    fn set_sender_name(&mut self, name: &str) -> Result<()>;

    /// Publish the texture behind `handle`; `texture` is its CPU-side content
    fn send_texture(
        &mut self,
        handle: TextureHandle,
        texture: &RgbaTexture,
        flip_vertically: bool,
    ) -> Result<()>;

    /// Mark the last sent frame as complete and safe to read
    fn set_frame_sync(&mut self, name: &str) -> Result<()>;

    /// Withdraw the sender; later sends fail
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<P: TexturePublisher + ?Sized> TexturePublisher for Box<P> {
    fn set_sender_name(&mut self, name: &str) -> Result<()> {
        (**self).set_sender_name(name)
    }

    fn send_texture(
        &mut self,
        handle: TextureHandle,
        texture: &RgbaTexture,
        flip_vertically: bool,
    ) -> Result<()> {
        (**self).send_texture(handle, texture, flip_vertically)
    }

    fn set_frame_sync(&mut self, name: &str) -> Result<()> {
        (**self).set_frame_sync(name)
    }

    fn release(&mut self) -> Result<()> {
        (**self).release()
    }
}

/// A publisher bound to its sender name.
///
/// The name is set at construction, so there is no way to send on an unnamed
/// channel. Dropping the channel releases the publisher.
pub struct PublishChannel<P: TexturePublisher> {
    name: String,
    publisher: P,
    frames_sent: u64,
    released: bool,
}

impl<P: TexturePublisher> PublishChannel<P> {
    pub fn new(name: impl Into<String>, mut publisher: P) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PublishError::EmptySenderName);
        }
        publisher.set_sender_name(&name)?;
        log::info!("Publish channel '{}' ready", name);

        Ok(Self {
            name,
            publisher,
            frames_sent: 0,
            released: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Send one texture, then signal that the frame is ready
    pub fn publish(
        &mut self,
        handle: TextureHandle,
        texture: &RgbaTexture,
        flip_vertically: bool,
    ) -> Result<()> {
        if self.released {
            return Err(PublishError::Released(self.name.clone()));
        }
        self.publisher.send_texture(handle, texture, flip_vertically)?;
        self.publisher.set_frame_sync(&self.name)?;
        self.frames_sent += 1;
        Ok(())
    }

    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        log::info!(
            "Releasing publish channel '{}' after {} frames",
            self.name,
            self.frames_sent
        );
        self.publisher.release()
    }
}

impl<P: TexturePublisher> Drop for PublishChannel<P> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Failed to release channel '{}': {}", self.name, e);
        }
    }
}

/// Header of a shared frame file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    pub frame: u64,
    pub flags: u32,
}

impl FrameHeader {
    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        out[0..4].copy_from_slice(&FRAME_MAGIC);
        out[4..8].copy_from_slice(&FRAME_VERSION.to_le_bytes());
        out[8..12].copy_from_slice(&self.width.to_le_bytes());
        out[12..16].copy_from_slice(&self.height.to_le_bytes());
        out[16..24].copy_from_slice(&self.frame.to_le_bytes());
        out[24..28].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    /// Parse a header; `None` if the magic or version does not match
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < FRAME_HEADER_LEN || bytes[0..4] != FRAME_MAGIC {
            return None;
        }
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        if u32_at(4) != FRAME_VERSION {
            return None;
        }
        let mut frame = [0u8; 8];
        frame.copy_from_slice(&bytes[16..24]);

        Some(Self {
            width: u32_at(8),
            height: u32_at(12),
            frame: u64::from_le_bytes(frame),
            flags: u32_at(24),
        })
    }
}

/// File-backed texture sharing for listeners on the same machine.
///
/// Each sender owns `<dir>/<name>.frame` (header + RGBA f32 payload, top row
/// first, replaced atomically) and `<dir>/<name>.sync` (index of the last
/// complete frame).
#[derive(Debug)]
pub struct SharedFramePublisher {
    dir: PathBuf,
    name: Option<String>,
    frame: u64,
    last_sent: Option<u64>,
    scratch: Vec<u8>,
}

impl SharedFramePublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            name: None,
            frame: 0,
            last_sent: None,
            scratch: Vec::new(),
        }
    }

    pub fn frame_path(&self) -> Option<PathBuf> {
        self.name.as_ref().map(|n| self.dir.join(format!("{n}.frame")))
    }

    pub fn sync_path(&self) -> Option<PathBuf> {
        self.name.as_ref().map(|n| self.dir.join(format!("{n}.sync")))
    }

    fn io_error(path: &Path, source: std::io::Error) -> PublishError {
        PublishError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn encode_payload(&mut self, texture: &RgbaTexture, flip_vertically: bool) {
        let header = FrameHeader {
            width: texture.width(),
            height: texture.height(),
            frame: self.frame,
            flags: if flip_vertically { FLAG_FLIPPED } else { 0 },
        };

        self.scratch.clear();
        self.scratch.extend_from_slice(&header.encode());

        let row_len = texture.width() as usize * 4;
        let rows: Box<dyn Iterator<Item = &[f32]>> = if flip_vertically {
            Box::new(texture.as_slice().chunks_exact(row_len.max(1)).rev())
        } else {
            Box::new(texture.as_slice().chunks_exact(row_len.max(1)))
        };
        for row in rows {
            self.scratch.extend_from_slice(bytemuck::cast_slice(row));
        }
    }
}

impl TexturePublisher for SharedFramePublisher {
    fn set_sender_name(&mut self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(PublishError::EmptySenderName);
        }
        if !is_file_safe_sender_name(name) {
            return Err(PublishError::InvalidSenderName(name.to_string()));
        }
        fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;
        self.name = Some(name.to_string());
        log::debug!("Shared frames for '{}' in {}", name, self.dir.display());
        Ok(())
    }

    fn send_texture(
        &mut self,
        handle: TextureHandle,
        texture: &RgbaTexture,
        flip_vertically: bool,
    ) -> Result<()> {
        let Some(path) = self.frame_path() else {
            return Err(PublishError::EmptySenderName);
        };

        let expected = handle.width as usize * handle.height as usize * 4;
        if texture.as_slice().len() != expected {
            return Err(PublishError::TextureSize {
                width: handle.width,
                height: handle.height,
                expected,
                actual: texture.as_slice().len(),
            });
        }

        self.encode_payload(texture, flip_vertically);

        let tmp = path.with_extension("frame.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| Self::io_error(&tmp, e))?;
        file.write_all(&self.scratch)
            .map_err(|e| Self::io_error(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &path).map_err(|e| Self::io_error(&path, e))?;

        log::trace!(
            "Sent {} frame {} ({}x{}) to {}",
            handle.kind,
            self.frame,
            handle.width,
            handle.height,
            path.display()
        );
        self.last_sent = Some(self.frame);
        self.frame += 1;
        Ok(())
    }

    fn set_frame_sync(&mut self, name: &str) -> Result<()> {
        let Some(frame) = self.last_sent else {
            return Ok(());
        };
        let path = self.dir.join(format!("{name}.sync"));
        fs::write(&path, frame.to_string()).map_err(|e| Self::io_error(&path, e))
    }

    fn release(&mut self) -> Result<()> {
        for path in [self.frame_path(), self.sync_path()].into_iter().flatten() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Self::io_error(&path, e)),
            }
        }
        self.name = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(width: u32, height: u32) -> TextureHandle {
        TextureHandle {
            kind: BufferKind::Depth,
            slot: 0,
            width,
            height,
        }
    }

    fn read_f32s(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    #[test]
    fn header_round_trip() {
        let header = FrameHeader {
            width: 800,
            height: 600,
            frame: 42,
            flags: FLAG_FLIPPED,
        };
        assert_eq!(FrameHeader::decode(&header.encode()), Some(header));
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut bytes = FrameHeader {
            width: 1,
            height: 1,
            frame: 0,
            flags: 0,
        }
        .encode();
        bytes[0] = b'X';
        assert_eq!(FrameHeader::decode(&bytes), None);
    }

    #[test]
    fn channel_rejects_empty_name() {
        let dir = tempfile::tempdir().unwrap();
        let result = PublishChannel::new("  ", SharedFramePublisher::new(dir.path()));
        assert!(matches!(result, Err(PublishError::EmptySenderName)));
    }

    #[test]
    fn shared_frame_written_and_synced() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel =
            PublishChannel::new("test-depth", SharedFramePublisher::new(dir.path())).unwrap();

        let texture = RgbaTexture::depth_target(2, 1);
        channel.publish(handle(2, 1), &texture, false).unwrap();

        let bytes = fs::read(dir.path().join("test-depth.frame")).unwrap();
        let header = FrameHeader::decode(&bytes).unwrap();
        assert_eq!((header.width, header.height, header.frame), (2, 1, 0));
        assert_eq!(
            read_f32s(&bytes[FRAME_HEADER_LEN..]),
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
        );

        let sync = fs::read_to_string(dir.path().join("test-depth.sync")).unwrap();
        assert_eq!(sync, "0");
        assert_eq!(channel.frames_sent(), 1);
    }

    #[test]
    fn flipped_frame_reverses_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut publisher = SharedFramePublisher::new(dir.path());
        publisher.set_sender_name("flip").unwrap();

        let mut texture = RgbaTexture::depth_target(1, 2);
        let depth = crate::core::capture::NormalizedPixels::from_snapshot(
            crate::core::capture::FrameSnapshot::new(BufferKind::Depth, 1, 2, vec![0.0, 1.0]),
        );
        crate::core::capture::compose_depth_texture(&depth, &mut texture).unwrap();

        publisher.send_texture(handle(1, 2), &texture, true).unwrap();

        let bytes = fs::read(dir.path().join("flip.frame")).unwrap();
        let header = FrameHeader::decode(&bytes).unwrap();
        assert_eq!(header.flags & FLAG_FLIPPED, FLAG_FLIPPED);
        let values = read_f32s(&bytes[FRAME_HEADER_LEN..]);
        assert_eq!(values[0], 1.0);
        assert_eq!(values[4], 0.0);
    }

    #[test]
    fn sender_names_must_be_plain_file_names() {
        for name in ["OpenSpace-yt-Depth", "depth.v2", "a..b"] {
            assert!(is_file_safe_sender_name(name), "{name} should be accepted");
        }
        for name in ["", "  ", "sub/depth", "../x", "..", ".", "dir\\depth", "/abs"] {
            assert!(!is_file_safe_sender_name(name), "{name:?} should be rejected");
        }
    }

    #[test]
    fn channel_with_path_name_fails_at_open() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["sub/depth", "../escape"] {
            let result = PublishChannel::new(name, SharedFramePublisher::new(dir.path()));
            assert!(
                matches!(result, Err(PublishError::InvalidSenderName(ref n)) if n == name),
                "{name} should fail when the channel opens"
            );
        }
        assert!(!dir.path().join("sub").exists());
        assert!(!dir.path().parent().unwrap().join("escape.frame").exists());
    }

    #[test]
    fn send_rejects_mismatched_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut publisher = SharedFramePublisher::new(dir.path());
        publisher.set_sender_name("size").unwrap();
        let texture = RgbaTexture::zeroed(2, 2);
        let err = publisher.send_texture(handle(3, 3), &texture, false).unwrap_err();
        assert!(matches!(err, PublishError::TextureSize { expected: 36, actual: 16, .. }));
    }

    #[test]
    fn release_removes_files_and_blocks_sends() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel =
            PublishChannel::new("gone", SharedFramePublisher::new(dir.path())).unwrap();
        channel
            .publish(handle(1, 1), &RgbaTexture::zeroed(1, 1), false)
            .unwrap();

        channel.release().unwrap();
        assert!(!dir.path().join("gone.frame").exists());
        assert!(!dir.path().join("gone.sync").exists());

        let err = channel
            .publish(handle(1, 1), &RgbaTexture::zeroed(1, 1), false)
            .unwrap_err();
        assert!(matches!(err, PublishError::Released(_)));
    }
}
