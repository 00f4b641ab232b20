//! The generation workflow: submit, poll, fetch.

use crate::clock::{CancelToken, Sleeper, TokioSleeper};
use crate::error::{sanitize_error_message, FrameflowError, Result, ENTITY_NOT_FOUND};
use crate::key::{CredentialSource, KeyProvider};
use crate::video::api::{Operation, SubmitRequest, VeoApi, VideoApi};
use crate::video::types::{
    GenerationRequest, VideoMetadata, VideoResource, RESOLUTION, VIDEO_MIME_TYPE,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default wait between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How long and how often to poll a running operation.
///
/// Both bounds are off by default, so polling continues until the operation
/// finishes or the caller cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait between status re-fetches.
    pub interval: Duration,
    /// Maximum number of re-fetches.
    pub max_polls: Option<u32>,
    /// Maximum time from submission until the operation is done.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_polls: None,
            timeout: None,
        }
    }
}

/// Builder for [`GenerationClient`].
#[derive(Default)]
pub struct GenerationClientBuilder {
    key_provider: Option<Arc<dyn KeyProvider>>,
    credentials: Option<Arc<dyn CredentialSource>>,
    api: Option<Arc<dyn VideoApi>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    policy: PollPolicy,
}

impl GenerationClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key selection capability.
    pub fn key_provider(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.key_provider = Some(provider);
        self
    }

    /// Sets where the API key is read from.
    pub fn credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the remote API. Defaults to [`VeoApi`].
    pub fn api(mut self, api: Arc<dyn VideoApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Sets the wait implementation. Defaults to [`TokioSleeper`].
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Sets the whole poll policy.
    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.policy.interval = interval;
        self
    }

    /// Caps the number of status re-fetches.
    pub fn max_polls(mut self, max_polls: u32) -> Self {
        self.policy.max_polls = Some(max_polls);
        self
    }

    /// Sets the maximum time to wait for generation.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.policy.timeout = Some(timeout);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<GenerationClient> {
        let api = match self.api {
            Some(api) => api,
            None => Arc::new(VeoApi::builder().build()?),
        };

        Ok(GenerationClient {
            key_provider: self.key_provider,
            credentials: self.credentials,
            api,
            sleeper: self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
            policy: self.policy,
            in_flight: AtomicBool::new(false),
        })
    }
}

/// Drives one image from submission to a playable video.
pub struct GenerationClient {
    key_provider: Option<Arc<dyn KeyProvider>>,
    credentials: Option<Arc<dyn CredentialSource>>,
    api: Arc<dyn VideoApi>,
    sleeper: Arc<dyn Sleeper>,
    policy: PollPolicy,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a generation settles or is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl GenerationClient {
    /// Creates a new `GenerationClientBuilder`.
    pub fn builder() -> GenerationClientBuilder {
        GenerationClientBuilder::new()
    }

    /// Returns the active poll policy.
    pub fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    /// Returns true while a generation is running.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Generates a video, polling until done.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<VideoResource> {
        self.generate_with_cancel(request, &CancelToken::new()).await
    }

    /// Generates a video; cancelling `cancel` stops the poll loop.
    ///
    /// Fails with [`FrameflowError::Busy`] without any remote call if another
    /// generation on this client has not settled.
    pub async fn generate_with_cancel(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<VideoResource> {
        let _in_flight = InFlight::acquire(&self.in_flight).ok_or(FrameflowError::Busy)?;
        let start = Instant::now();

        let api_key = self.resolve_key().await?;

        let submit = SubmitRequest {
            prompt: request.effective_prompt().to_string(),
            image_base64: request.image.to_base64(),
            mime_type: request.image.mime_type.clone(),
            aspect_ratio: request.aspect_ratio.as_str().to_string(),
            resolution: RESOLUTION.to_string(),
            number_of_videos: 1,
        };

        let operation = self.api.submit(&api_key, &submit).await?;
        tracing::info!(operation = %operation.name, model = self.api.model(), "submitted video generation request");

        let (operation, polls) = self.poll(operation, &api_key, start, cancel).await?;

        let uri = self.download_link(operation)?;
        tracing::debug!(polls, "video generation complete");

        let data = self.download(&uri, &api_key).await?;
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(size_bytes = data.len(), duration_ms, "downloaded generated video");

        Ok(VideoResource::new(
            data,
            VIDEO_MIME_TYPE,
            VideoMetadata {
                model: Some(self.api.model().to_string()),
                duration_ms: Some(duration_ms),
                polls,
                aspect_ratio: Some(request.aspect_ratio),
                resolution: Some(RESOLUTION.to_string()),
            },
        ))
    }

    /// Checks the environment and key, selecting one if needed.
    async fn resolve_key(&self) -> Result<String> {
        let provider = self
            .key_provider
            .as_ref()
            .filter(|p| p.is_available())
            .ok_or_else(|| {
                FrameflowError::EnvironmentUnavailable(
                    "no key selection capability is available".into(),
                )
            })?;

        let selected = match provider.has_selected_api_key().await {
            Ok(selected) => selected,
            Err(e) => {
                tracing::warn!("key check failed, treating key as absent: {e}");
                false
            }
        };
        if !selected {
            // Selection is not confirmed back; carry on as if it succeeded.
            provider.open_select_key().await.inspect_err(|e| {
                tracing::warn!("key selection failed: {e}");
            })?;
        }

        self.credentials
            .as_ref()
            .and_then(|c| c.api_key())
            .ok_or_else(|| {
                FrameflowError::KeyNotConfigured("no API key is available after selection".into())
            })
    }

    /// Re-fetches the operation until it is done, the policy bound is hit, or
    /// the caller cancels. Returns the final operation and the poll count.
    async fn poll(
        &self,
        mut operation: Operation,
        api_key: &str,
        start: Instant,
        cancel: &CancelToken,
    ) -> Result<(Operation, u32)> {
        let name = operation.name.clone();
        let mut polls = 0u32;

        while !operation.done {
            if let Some(message) = operation.error.take() {
                return Err(FrameflowError::VideoGeneration(message));
            }
            if self.policy.max_polls.is_some_and(|max| polls >= max) {
                return Err(FrameflowError::Timeout(start.elapsed()));
            }
            if let Some(timeout) = self.policy.timeout {
                if start.elapsed() + self.policy.interval > timeout {
                    return Err(FrameflowError::Timeout(timeout));
                }
            }

            tokio::select! {
                _ = self.sleeper.sleep(self.policy.interval) => {}
                _ = cancel.cancelled() => return Err(FrameflowError::Cancelled),
            }

            operation = self.api.get_operation(api_key, &name).await?;
            polls += 1;
            tracing::debug!(
                operation = %name,
                polls,
                elapsed_secs = start.elapsed().as_secs(),
                "polling Veo video generation"
            );
        }

        if let Some(message) = operation.error.take() {
            return Err(FrameflowError::VideoGeneration(message));
        }
        Ok((operation, polls))
    }

    fn download_link(&self, operation: Operation) -> Result<String> {
        let filtered = operation.filtered_count;
        match operation.video_uris.into_iter().next() {
            Some(uri) => Ok(uri),
            None if filtered > 0 => Err(FrameflowError::ContentBlocked(
                "Video was filtered by Veo safety filters".into(),
            )),
            None => Err(FrameflowError::NoDownloadLink),
        }
    }

    async fn download(&self, uri: &str, api_key: &str) -> Result<Vec<u8>> {
        let response = self.api.fetch(&with_key_param(uri, api_key)).await?;
        if response.is_success() {
            return Ok(response.body);
        }

        let body = response.text();
        if response.status == 404 && body.contains(ENTITY_NOT_FOUND) {
            if let Some(provider) = &self.key_provider {
                if let Err(e) = provider.open_select_key().await {
                    tracing::warn!("key re-selection failed: {e}");
                }
            }
            return Err(FrameflowError::InvalidKey(
                "the API key cannot access the generated video; select a key from a project with billing enabled"
                    .into(),
            ));
        }

        Err(FrameflowError::Fetch {
            status: response.status,
            body: sanitize_error_message(&body),
        })
    }
}

/// Appends the API key as the `key` query parameter.
fn with_key_param(uri: &str, api_key: &str) -> String {
    if uri.contains('?') {
        format!("{uri}&key={api_key}")
    } else {
        format!("{uri}?key={api_key}")
    }
}
