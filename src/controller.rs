//! Form state for the animate-an-image flow.
//!
//! [`Controller`] owns everything the form shows: the chosen image and its
//! preview, prompt, aspect ratio, what is known about the API key, the
//! loading flag, and the last error or video. Front ends call its operations
//! and draw [`Controller::view`], or follow [`Controller::subscribe`] to
//! redraw while a generation is running.

use crate::clock::CancelToken;
use crate::error::{ErrorClass, FrameflowError, Result};
use crate::key::{KeyProvider, KeyState};
use crate::video::{
    AspectRatio, GenerationClient, GenerationRequest, ImageFile, SelectedImage, VideoResource,
};
use std::sync::Arc;
use tokio::sync::watch;

/// File picker filter.
pub const ACCEPT_IMAGES: &str = "image/*";

/// Billing documentation linked from the form.
pub const BILLING_URL: &str = "https://ai.google.dev/gemini-api/docs/billing";

const INVALID_FILE_MESSAGE: &str = "Please select a valid image file.";
const NO_IMAGE_MESSAGE: &str = "Please select an image first.";
const NO_KEY_MESSAGE: &str = "Please select an API key before generating.";
const BUSY_MESSAGE: &str = "A video is already being generated.";

/// An error as shown in the banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiError {
    /// Human-readable text.
    pub message: String,
    /// Coarse class, used to decide on key re-selection.
    pub class: ErrorClass,
}

impl UiError {
    fn from_error(err: &FrameflowError) -> Self {
        Self {
            message: err.user_message(),
            class: err.class(),
        }
    }
}

/// Everything the form holds.
#[derive(Debug, Clone, Default)]
pub struct UiState {
    /// The image to animate.
    pub image: Option<SelectedImage>,
    /// Preview reference for the selected image.
    pub preview: Option<String>,
    /// Prompt text as typed.
    pub prompt: String,
    /// Chosen aspect ratio.
    pub aspect_ratio: AspectRatio,
    /// What is known about the API key.
    pub key_state: KeyState,
    /// True while a generation runs.
    pub loading: bool,
    /// Last error, if any.
    pub error: Option<UiError>,
    /// Last generated video, if any.
    pub result: Option<VideoResource>,
}

/// One aspect ratio choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AspectRatioOption {
    /// The ratio.
    pub ratio: AspectRatio,
    /// True for the current choice.
    pub selected: bool,
}

/// The result video as bound to a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoView {
    /// Playback URI.
    pub uri: String,
    /// MIME type.
    pub mime_type: String,
}

/// Render model for the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    /// File picker filter.
    pub accept: &'static str,
    /// Prompt text.
    pub prompt: String,
    /// Mutually exclusive aspect ratio choices.
    pub aspect_ratios: Vec<AspectRatioOption>,
    /// Whether the primary action can be pressed.
    pub generate_enabled: bool,
    /// Whether to show the "select key" prompt.
    pub show_key_prompt: bool,
    /// Loading indicator.
    pub loading: bool,
    /// Error banner text.
    pub error: Option<String>,
    /// Image preview reference.
    pub preview: Option<String>,
    /// Video player source.
    pub video: Option<VideoView>,
    /// Billing documentation link.
    pub billing_url: &'static str,
}

/// Clears the loading flag however the generation ends, publishing both edges.
struct Loading<'a> {
    state: &'a mut UiState,
    updates: &'a watch::Sender<View>,
}

impl<'a> Loading<'a> {
    fn start(state: &'a mut UiState, updates: &'a watch::Sender<View>) -> Self {
        state.loading = true;
        updates.send_replace(render(state));
        Self { state, updates }
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        self.state.loading = false;
        self.updates.send_replace(render(self.state));
    }
}

/// Owns the form state and gates the generate action.
pub struct Controller {
    keys: Arc<dyn KeyProvider>,
    client: GenerationClient,
    state: UiState,
    updates: watch::Sender<View>,
}

impl Controller {
    /// Creates a controller. `keys` should be the same capability the client uses.
    pub fn new(keys: Arc<dyn KeyProvider>, client: GenerationClient) -> Self {
        let state = UiState::default();
        let (updates, _) = watch::channel(render(&state));
        Self {
            keys,
            client,
            state,
            updates,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> &UiState {
        &self.state
    }

    /// Returns a receiver that sees a fresh [`View`] after every state change.
    pub fn subscribe(&self) -> watch::Receiver<View> {
        self.updates.subscribe()
    }

    fn publish(&self) {
        self.updates.send_replace(render(&self.state));
    }

    /// Stores an image if its declared type is an image type.
    pub fn select_image(&mut self, file: ImageFile) -> Result<()> {
        if !file.is_image() {
            self.state.image = None;
            self.state.preview = None;
            let err = FrameflowError::Validation(INVALID_FILE_MESSAGE.into());
            self.state.error = Some(UiError::from_error(&err));
            self.publish();
            return Err(err);
        }

        let mime_type = file.declared_type.unwrap_or_default();
        let image = SelectedImage {
            data: file.data,
            mime_type,
            file_name: Some(file.name),
        };
        tracing::debug!(mime_type = %image.mime_type, size_bytes = image.data.len(), "image selected");
        self.state.preview = Some(image.to_data_url());
        self.state.image = Some(image);
        self.state.error = None;
        self.publish();
        Ok(())
    }

    /// Sets the prompt text.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.state.prompt = prompt.into();
        self.publish();
    }

    /// Sets the aspect ratio.
    pub fn set_aspect_ratio(&mut self, ratio: AspectRatio) {
        self.state.aspect_ratio = ratio;
        self.publish();
    }

    /// Asks the environment whether a key is selected.
    ///
    /// Any failure counts as "no key".
    pub async fn check_key_status(&mut self) -> KeyState {
        self.state.key_state = match self.keys.has_selected_api_key().await {
            Ok(true) => KeyState::Confirmed,
            Ok(false) => KeyState::Missing,
            Err(e) => {
                tracing::warn!("key status check failed: {e}");
                KeyState::Missing
            }
        };
        self.publish();
        self.state.key_state
    }

    /// Opens key selection; on success the key is assumed present.
    pub async fn request_key_selection(&mut self) -> Result<()> {
        let result = self.keys.open_select_key().await;
        match &result {
            Ok(()) => {
                self.state.key_state = KeyState::Assumed;
                self.state.error = None;
            }
            Err(e) => self.state.error = Some(UiError::from_error(e)),
        }
        self.publish();
        result
    }

    /// Records a selection result pushed by the environment.
    pub fn confirm_key_selected(&mut self, selected: bool) {
        self.state.key_state = if selected {
            KeyState::Confirmed
        } else {
            KeyState::Missing
        };
        self.publish();
    }

    /// Returns true when the primary action should be enabled.
    pub fn can_generate(&self) -> bool {
        can_generate(&self.state)
    }

    /// Generates a video from the current form.
    pub async fn generate(&mut self) -> Result<()> {
        self.generate_with_cancel(&CancelToken::new()).await
    }

    /// Generates a video; `cancel` stops the poll loop.
    ///
    /// Preconditions are checked before any remote call. The outcome is stored
    /// in the state and also returned.
    pub async fn generate_with_cancel(&mut self, cancel: &CancelToken) -> Result<()> {
        if self.state.loading {
            return Err(self.reject(BUSY_MESSAGE));
        }
        let Some(image) = self.state.image.clone() else {
            return Err(self.reject(NO_IMAGE_MESSAGE));
        };
        if self.state.key_state.is_missing() {
            return Err(self.reject(NO_KEY_MESSAGE));
        }

        let request = GenerationRequest::new(self.state.prompt.clone(), image)
            .with_aspect_ratio(self.state.aspect_ratio);
        self.state.error = None;
        self.state.result = None;

        let outcome = {
            let _loading = Loading::start(&mut self.state, &self.updates);
            self.client.generate_with_cancel(&request, cancel).await
        };

        let result = match outcome {
            Ok(video) => {
                tracing::info!(size_bytes = video.size(), "video ready");
                self.state.result = Some(video);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("generation failed: {e}");
                self.state.error = Some(UiError::from_error(&e));
                if e.is_key_error() {
                    self.state.key_state = KeyState::Missing;
                    // Keep the generation error in the banner.
                    match self.keys.open_select_key().await {
                        Ok(()) => self.state.key_state = KeyState::Assumed,
                        Err(sel) => tracing::warn!("key re-selection failed: {sel}"),
                    }
                }
                Err(e)
            }
        };
        self.publish();
        result
    }

    fn reject(&mut self, message: &str) -> FrameflowError {
        let err = FrameflowError::Validation(message.into());
        self.state.error = Some(UiError::from_error(&err));
        self.publish();
        err
    }

    /// Builds the render model.
    pub fn view(&self) -> View {
        render(&self.state)
    }
}

fn render(state: &UiState) -> View {
    View {
        accept: ACCEPT_IMAGES,
        prompt: state.prompt.clone(),
        aspect_ratios: AspectRatio::ALL
            .iter()
            .map(|&ratio| AspectRatioOption {
                ratio,
                selected: ratio == state.aspect_ratio,
            })
            .collect(),
        generate_enabled: can_generate(state),
        show_key_prompt: state.key_state.is_missing(),
        loading: state.loading,
        error: state.error.as_ref().map(|e| e.message.clone()),
        preview: state.preview.clone(),
        video: state.result.as_ref().map(|v| VideoView {
            uri: v.uri(),
            mime_type: v.mime_type.clone(),
        }),
        billing_url: BILLING_URL,
    }
}

fn can_generate(state: &UiState) -> bool {
    !state.loading && state.image.is_some() && !state.key_state.is_missing()
}
