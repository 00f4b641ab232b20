#![warn(missing_docs)]
//! Frameflow - animate a still image into a short video with Veo.
//!
//! The crate has two layers:
//!
//! - [`GenerationClient`] drives one request through the remote workflow:
//!   key check, submission, polling, and download.
//! - [`Controller`] owns form state (image, prompt, aspect ratio, key state,
//!   loading, error, result), gates the generate action, and renders a
//!   [`View`](controller::View).
//!
//! The key selection capability ([`KeyProvider`]), the remote API
//! ([`VideoApi`]) and the poll wait ([`Sleeper`]) are injected, so both
//! layers can run against stubs.
//!
//! # Quick Start
//!
//! ```no_run
//! use frameflow::{EnvKeys, GenerationClient, GenerationRequest, SelectedImage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> frameflow::Result<()> {
//!     let keys = Arc::new(EnvKeys::from_env());
//!     let client = GenerationClient::builder()
//!         .key_provider(keys.clone())
//!         .credentials(keys)
//!         .build()?;
//!
//!     let image = SelectedImage::new(std::fs::read("cat.jpg")?, "image/jpeg");
//!     let video = client.generate(&GenerationRequest::new("", image)).await?;
//!     video.save("cat.mp4")?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod controller;
mod error;
pub mod key;
pub mod video;

#[cfg(test)]
mod test_support;

pub use clock::{CancelToken, Sleeper, TokioSleeper};
pub use controller::{Controller, UiState, View};
pub use error::{ErrorClass, FrameflowError, Result};
pub use key::{CredentialSource, EnvKeys, KeyProvider, KeyState, StaticKey};
pub use video::{
    AspectRatio, GenerationClient, GenerationClientBuilder, GenerationRequest, ImageFile,
    PollPolicy, SelectedImage, VeoApi, VeoModel, VideoApi, VideoResource,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::controller::Controller;
    pub use crate::error::{FrameflowError, Result};
    pub use crate::key::{EnvKeys, KeyProvider};
    pub use crate::video::{
        AspectRatio, GenerationClient, GenerationRequest, ImageFile, SelectedImage,
        VideoResource,
    };
}
