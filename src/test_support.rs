//! Stub capabilities shared by unit tests.

use crate::clock::Sleeper;
use crate::error::{FrameflowError, Result};
use crate::key::{CredentialSource, KeyProvider};
use crate::video::api::{FetchResponse, Operation, SubmitRequest, VideoApi};
use crate::video::SelectedImage;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const VIDEO_URI: &str = "https://example.com/files/video.mp4";
pub(crate) const NOT_FOUND_BODY: &str =
    r#"{"error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}}"#;

/// A tiny JPEG-typed image.
pub(crate) fn jpeg_image() -> SelectedImage {
    SelectedImage::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10], "image/jpeg")
}

/// Key provider and credential source with scripted answers.
pub(crate) struct StubKeys {
    available: bool,
    fail_check: bool,
    fail_open: bool,
    key: Mutex<Option<String>>,
    key_on_open: Option<String>,
    open_calls: AtomicU32,
    check_calls: AtomicU32,
}

impl StubKeys {
    pub(crate) fn selected(key: &str) -> Self {
        Self::with(Some(key.to_string()))
    }

    pub(crate) fn unselected() -> Self {
        Self::with(None)
    }

    fn with(key: Option<String>) -> Self {
        Self {
            available: true,
            fail_check: false,
            fail_open: false,
            key: Mutex::new(key),
            key_on_open: None,
            open_calls: AtomicU32::new(0),
            check_calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub(crate) fn failing_check(mut self) -> Self {
        self.fail_check = true;
        self
    }

    pub(crate) fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Opening the selection flow installs `key`.
    pub(crate) fn selecting(mut self, key: &str) -> Self {
        self.key_on_open = Some(key.to_string());
        self
    }

    pub(crate) fn open_calls(&self) -> u32 {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn check_calls(&self) -> u32 {
        self.check_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyProvider for StubKeys {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn has_selected_api_key(&self) -> Result<bool> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_check {
            return Err(FrameflowError::KeySelection("check failed".into()));
        }
        Ok(self.key.lock().unwrap().is_some())
    }

    async fn open_select_key(&self) -> Result<()> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(FrameflowError::KeySelection("dialog failed".into()));
        }
        if let Some(key) = &self.key_on_open {
            *self.key.lock().unwrap() = Some(key.clone());
        }
        Ok(())
    }
}

impl CredentialSource for StubKeys {
    fn api_key(&self) -> Option<String> {
        self.key.lock().unwrap().clone()
    }
}

/// Video API whose operation reports not-done a fixed number of times.
pub(crate) struct StubApi {
    not_done_reports: u32,
    with_videos: bool,
    filtered: bool,
    error: Option<String>,
    fetch: FetchResponse,
    status_calls: AtomicU32,
    submitted: Mutex<Vec<SubmitRequest>>,
    submit_keys: Mutex<Vec<String>>,
    polled_names: Mutex<Vec<String>>,
    fetched_urls: Mutex<Vec<String>>,
}

impl StubApi {
    pub(crate) const OPERATION_NAME: &'static str = "models/veo/operations/op-1";

    /// Submission counts as the first not-done report, so `n` not-done
    /// reports mean `n` status re-fetches.
    pub(crate) fn completing_after(n: u32) -> Self {
        Self {
            not_done_reports: n,
            with_videos: true,
            filtered: false,
            error: None,
            fetch: FetchResponse {
                status: 200,
                body: b"video-bytes".to_vec(),
            },
            status_calls: AtomicU32::new(0),
            submitted: Mutex::new(Vec::new()),
            submit_keys: Mutex::new(Vec::new()),
            polled_names: Mutex::new(Vec::new()),
            fetched_urls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn without_videos(mut self) -> Self {
        self.with_videos = false;
        self
    }

    pub(crate) fn filtered(mut self) -> Self {
        self.filtered = true;
        self
    }

    /// The status re-fetch that finishes the operation carries `message`.
    pub(crate) fn failing_with(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    pub(crate) fn fetch_returns(mut self, status: u16, body: &str) -> Self {
        self.fetch = FetchResponse {
            status,
            body: body.as_bytes().to_vec(),
        };
        self
    }

    fn operation(&self, done: bool, error: Option<String>) -> Operation {
        Operation {
            name: Self::OPERATION_NAME.to_string(),
            done,
            error,
            video_uris: if done && self.with_videos {
                vec![VIDEO_URI.to_string()]
            } else {
                Vec::new()
            },
            filtered_count: u32::from(done && self.filtered),
        }
    }

    pub(crate) fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn submitted(&self) -> Vec<SubmitRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn submit_keys(&self) -> Vec<String> {
        self.submit_keys.lock().unwrap().clone()
    }

    pub(crate) fn polled_names(&self) -> Vec<String> {
        self.polled_names.lock().unwrap().clone()
    }

    pub(crate) fn fetched_urls(&self) -> Vec<String> {
        self.fetched_urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoApi for StubApi {
    async fn submit(&self, api_key: &str, request: &SubmitRequest) -> Result<Operation> {
        self.submitted.lock().unwrap().push(request.clone());
        self.submit_keys.lock().unwrap().push(api_key.to_string());
        Ok(self.operation(self.not_done_reports == 0, None))
    }

    async fn get_operation(&self, _api_key: &str, name: &str) -> Result<Operation> {
        let calls = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.polled_names.lock().unwrap().push(name.to_string());
        let done = calls >= self.not_done_reports;
        let error = if done { self.error.clone() } else { None };
        Ok(self.operation(done, error))
    }

    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        self.fetched_urls.lock().unwrap().push(url.to_string());
        Ok(self.fetch.clone())
    }

    fn model(&self) -> &str {
        "veo-stub"
    }
}

/// Returns immediately, recording each requested wait.
#[derive(Default)]
pub(crate) struct RecordingSleeper {
    calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub(crate) fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.calls.lock().unwrap().push(duration);
    }
}
