//! Image-to-video generation.

pub mod api;
mod client;
mod types;

pub use api::{VeoApi, VeoApiBuilder, VeoModel, VideoApi};
pub use client::{GenerationClient, GenerationClientBuilder, PollPolicy, DEFAULT_POLL_INTERVAL};
pub use types::{
    AspectRatio, GenerationRequest, ImageFile, ImageFormat, SelectedImage, VideoMetadata,
    VideoResource, DEFAULT_PROMPT, RESOLUTION, VIDEO_MIME_TYPE,
};
