//! Remote endpoints for Veo video generation.

use crate::error::{parse_retry_after, sanitize_error_message, FrameflowError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Default Gemini Developer API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Veo model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VeoModel {
    /// Veo 3.1 Fast Preview.
    #[default]
    Veo31FastPreview,
    /// Veo 3.1 Preview.
    Veo31Preview,
}

impl VeoModel {
    /// Returns the API model identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Veo31FastPreview => "veo-3.1-fast-generate-preview",
            Self::Veo31Preview => "veo-3.1-generate-preview",
        }
    }
}

/// One submission, with the image already encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Prompt text (never empty).
    pub prompt: String,
    /// Base64 image payload.
    pub image_base64: String,
    /// Image MIME type.
    pub mime_type: String,
    /// Aspect ratio string, e.g. "16:9".
    pub aspect_ratio: String,
    /// Output resolution, e.g. "720p".
    pub resolution: String,
    /// Number of videos to generate.
    pub number_of_videos: u32,
}

/// State of a remote generation job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Operation {
    /// Opaque operation name used for polling.
    pub name: String,
    /// True once the job has finished.
    pub done: bool,
    /// Failure message reported by the job.
    pub error: Option<String>,
    /// Download URIs of generated videos, in order.
    pub video_uris: Vec<String>,
    /// Number of outputs removed by safety filters.
    pub filtered_count: u32,
}

/// Raw result of a video download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body (video bytes, or error text).
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as text, for error reporting.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The three endpoints a generation talks to.
#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Starts a generation job.
    async fn submit(&self, api_key: &str, request: &SubmitRequest) -> Result<Operation>;

    /// Re-fetches the state of a job.
    async fn get_operation(&self, api_key: &str, name: &str) -> Result<Operation>;

    /// Downloads a generated artifact. The URL already carries the key.
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;

    /// Model identifier used for submissions.
    fn model(&self) -> &str;
}

/// Builder for [`VeoApi`].
#[derive(Debug, Clone, Default)]
pub struct VeoApiBuilder {
    model: VeoModel,
    base_url: Option<String>,
}

impl VeoApiBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Veo model variant.
    pub fn model(mut self, model: VeoModel) -> Self {
        self.model = model;
        self
    }

    /// Sets the API base URL. Falls back to `FRAMEFLOW_BASE_URL`, then the public endpoint.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Builds the API client.
    pub fn build(self) -> Result<VeoApi> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var("FRAMEFLOW_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .user_agent(concat!("frameflow/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(VeoApi {
            client,
            model: self.model,
            base_url,
        })
    }
}

/// Veo over the Gemini Developer API.
pub struct VeoApi {
    client: reqwest::Client,
    model: VeoModel,
    base_url: String,
}

impl VeoApi {
    /// Creates a new `VeoApiBuilder`.
    pub fn builder() -> VeoApiBuilder {
        VeoApiBuilder::new()
    }

    /// Returns the base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_operation(&self, response: reqwest::Response) -> Result<Operation> {
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }
        let operation: VeoOperationResponse = response.json().await?;
        Ok(operation.into())
    }
}

#[async_trait]
impl VideoApi for VeoApi {
    async fn submit(&self, api_key: &str, request: &SubmitRequest) -> Result<Operation> {
        let url = format!(
            "{}/models/{}:predictLongRunning",
            self.base_url,
            self.model.as_str()
        );
        let body = VeoRequest::from_submit(request);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        self.read_operation(response).await
    }

    async fn get_operation(&self, api_key: &str, name: &str) -> Result<Operation> {
        let url = format!("{}/{}", self.base_url, name);

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", api_key)
            .send()
            .await?;

        self.read_operation(response).await
    }

    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        // The URL carries the key; keep it out of error text and logs.
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(reqwest::Error::without_url)?
            .to_vec();
        Ok(FetchResponse { status, body })
    }

    fn model(&self) -> &str {
        self.model.as_str()
    }
}

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> FrameflowError {
    let text = sanitize_error_message(text);
    if status == 429 {
        let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
        return FrameflowError::RateLimited { retry_after };
    }
    if status == 401 || status == 403 {
        return FrameflowError::Auth(text);
    }
    let lower = text.to_lowercase();
    if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited") {
        return FrameflowError::ContentBlocked(text);
    }
    FrameflowError::Api {
        status,
        message: text,
    }
}

// ── Wire format ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoRequest {
    instances: Vec<VeoInstance>,
    parameters: VeoParameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoInstance {
    prompt: String,
    image: VeoImage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoParameters {
    aspect_ratio: String,
    resolution: String,
    number_of_videos: u32,
}

impl VeoRequest {
    fn from_submit(req: &SubmitRequest) -> Self {
        Self {
            instances: vec![VeoInstance {
                prompt: req.prompt.clone(),
                image: VeoImage {
                    bytes_base64_encoded: req.image_base64.clone(),
                    mime_type: req.mime_type.clone(),
                },
            }],
            parameters: VeoParameters {
                aspect_ratio: req.aspect_ratio.clone(),
                resolution: req.resolution.clone(),
                number_of_videos: req.number_of_videos,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct VeoOperationResponse {
    name: String,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    response: Option<VeoVideoResponse>,
    #[serde(default)]
    error: Option<VeoError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeoVideoResponse {
    #[serde(default)]
    generate_video_response: Option<VeoGenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeoGenerateVideoResponse {
    #[serde(default)]
    generated_samples: Option<Vec<VeoGeneratedSample>>,
    #[serde(default)]
    rai_media_filtered_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct VeoGeneratedSample {
    #[serde(default)]
    video: Option<VeoVideo>,
}

#[derive(Debug, Deserialize)]
struct VeoVideo {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VeoError {
    #[serde(default)]
    message: Option<String>,
}

impl From<VeoOperationResponse> for Operation {
    fn from(op: VeoOperationResponse) -> Self {
        let generated = op.response.and_then(|r| r.generate_video_response);
        let filtered_count = generated
            .as_ref()
            .and_then(|g| g.rai_media_filtered_count)
            .unwrap_or(0);
        let video_uris = generated
            .and_then(|g| g.generated_samples)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| s.video.and_then(|v| v.uri))
            .collect();

        Self {
            name: op.name,
            done: op.done.unwrap_or(false),
            error: op
                .error
                .map(|e| e.message.unwrap_or_else(|| "Unknown error".into())),
            video_uris,
            filtered_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submit_request() -> SubmitRequest {
        SubmitRequest {
            prompt: "Ocean waves".into(),
            image_base64: "AQID".into(),
            mime_type: "image/jpeg".into(),
            aspect_ratio: "9:16".into(),
            resolution: "720p".into(),
            number_of_videos: 1,
        }
    }

    #[test]
    fn test_veo_model_as_str() {
        assert_eq!(
            VeoModel::default().as_str(),
            "veo-3.1-fast-generate-preview"
        );
        assert_eq!(VeoModel::Veo31Preview.as_str(), "veo-3.1-generate-preview");
    }

    #[test]
    fn test_builder_explicit_base_url_trims_slash() {
        let api = VeoApi::builder()
            .base_url("http://localhost:8080/v1beta/")
            .build()
            .unwrap();
        assert_eq!(api.base_url(), "http://localhost:8080/v1beta");
        assert_eq!(api.model(), "veo-3.1-fast-generate-preview");
    }

    #[test]
    fn test_request_serialization_uses_camel_case() {
        let json = serde_json::to_value(VeoRequest::from_submit(&submit_request())).unwrap();

        let instance = &json["instances"][0];
        assert_eq!(instance["prompt"], "Ocean waves");
        assert_eq!(instance["image"]["bytesBase64Encoded"], "AQID");
        assert_eq!(instance["image"]["mimeType"], "image/jpeg");

        let params = &json["parameters"];
        assert_eq!(params["aspectRatio"], "9:16");
        assert_eq!(params["resolution"], "720p");
        assert_eq!(params["numberOfVideos"], 1);
    }

    #[test]
    fn test_operation_not_done() {
        let json = r#"{"name": "models/veo/operations/123", "done": false}"#;
        let op: Operation = serde_json::from_str::<VeoOperationResponse>(json)
            .unwrap()
            .into();
        assert_eq!(op.name, "models/veo/operations/123");
        assert!(!op.done);
        assert!(op.video_uris.is_empty());
    }

    #[test]
    fn test_operation_missing_done_means_not_done() {
        let json = r#"{"name": "operations/1"}"#;
        let op: Operation = serde_json::from_str::<VeoOperationResponse>(json)
            .unwrap()
            .into();
        assert!(!op.done);
    }

    #[test]
    fn test_operation_done_with_video() {
        let json = r#"{
            "name": "operations/123",
            "done": true,
            "response": {
                "generateVideoResponse": {
                    "generatedSamples": [
                        {"video": {"uri": "https://example.com/a.mp4"}},
                        {"video": {}},
                        {"video": {"uri": "https://example.com/b.mp4"}}
                    ]
                }
            }
        }"#;
        let op: Operation = serde_json::from_str::<VeoOperationResponse>(json)
            .unwrap()
            .into();
        assert!(op.done);
        assert_eq!(
            op.video_uris,
            vec!["https://example.com/a.mp4", "https://example.com/b.mp4"]
        );
        assert_eq!(op.filtered_count, 0);
    }

    #[test]
    fn test_operation_with_error_and_filtering() {
        let json = r#"{
            "name": "operations/123",
            "done": true,
            "response": {"generateVideoResponse": {"raiMediaFilteredCount": 1}},
            "error": {"message": "Quota exceeded"}
        }"#;
        let op: Operation = serde_json::from_str::<VeoOperationResponse>(json)
            .unwrap()
            .into();
        assert_eq!(op.error.as_deref(), Some("Quota exceeded"));
        assert_eq!(op.filtered_count, 1);
    }

    #[test]
    fn test_parse_error_mapping() {
        let headers = reqwest::header::HeaderMap::new();
        assert!(matches!(
            parse_error(403, "forbidden", &headers),
            FrameflowError::Auth(_)
        ));
        assert!(matches!(
            parse_error(429, "slow down", &headers),
            FrameflowError::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            parse_error(400, "Prompt blocked by safety filters", &headers),
            FrameflowError::ContentBlocked(_)
        ));
        match parse_error(404, "Requested entity was not found.", &headers) {
            err @ FrameflowError::Api { status: 404, .. } => assert!(err.is_key_error()),
            other => panic!("Expected Api error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_transport_error_hides_key() {
        let api = VeoApi::builder().build().unwrap();

        // Nothing listens on port 1, so the request fails before any response.
        let err = api
            .fetch("http://127.0.0.1:1/v.mp4?key=SECRET123")
            .await
            .unwrap_err();

        assert!(matches!(err, FrameflowError::Network(_)));
        assert!(!err.to_string().contains("SECRET123"));
        assert!(!err.user_message().contains("SECRET123"));
    }

    #[test]
    fn test_fetch_response_helpers() {
        let ok = FetchResponse {
            status: 200,
            body: vec![0, 1],
        };
        assert!(ok.is_success());

        let missing = FetchResponse {
            status: 404,
            body: b"Requested entity was not found.".to_vec(),
        };
        assert!(!missing.is_success());
        assert_eq!(missing.text(), "Requested entity was not found.");
    }
}
