pub mod capture;
pub mod controller;
pub mod gpu_context;
pub mod input_adapter;
pub mod publish_loop;
pub mod publisher;
pub mod timer;

pub use capture::{capture_buffer, compose_color_texture, compose_depth_texture, BufferKind, Framebuffers, RgbaTexture};
pub use publish_loop::{FrameHost, PublishLoop};
pub use publisher::{PublishChannel, SharedFramePublisher, TextureHandle, TexturePublisher};
