use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::encoder;
use crate::errors::{AdGenError, Result};

/// Output shape of the generated media.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AspectRatio {
    /// "1:1", the only ratio the image model is asked for.
    #[default]
    Square,
    /// "9:16".
    Portrait,
    /// "16:9".
    Landscape,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait => "9:16",
            Self::Landscape => "16:9",
        }
    }

    /// Whether this ratio is accepted for the given mode.
    pub fn supports(&self, mode: MediaKind) -> bool {
        match mode {
            MediaKind::Image => matches!(self, Self::Square),
            MediaKind::Video => matches!(self, Self::Portrait | Self::Landscape),
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video output resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Resolution {
    #[default]
    P720,
    P1080,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P720 => "720p",
            Self::P1080 => "1080p",
        }
    }
}

/// Image or video. Used both as request mode and result kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Base64-encoded image used as the starting frame of a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    /// Base64 payload without any `data:` prefix.
    pub data: String,
    /// e.g. "image/png".
    pub mime_type: String,
}

impl ReferenceImage {
    /// Encode raw bytes with an explicit MIME type.
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: encoder::encode_bytes(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Read and encode an image file. The MIME type is sniffed from the content.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        encoder::encode_file(path).await
    }

    /// Parse a `data:<mime>;base64,<payload>` URI.
    ///
    /// Plain base64 input is accepted too, with the MIME type sniffed from the
    /// decoded bytes.
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let payload = encoder::strip_data_uri_prefix(uri);
        let bytes = encoder::decode(payload)?;
        let mime_type = uri
            .strip_prefix("data:")
            .and_then(|rest| rest.split([';', ',']).next())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or_else(|| encoder::detect_mime(&bytes).map(str::to_string))
            .ok_or_else(|| AdGenError::Validation("unrecognised image type".into()))?;
        Ok(Self {
            data: payload.to_string(),
            mime_type,
        })
    }
}

/// A single image or video generation request.
///
/// # Example
///
/// ```
/// use adgen::{AspectRatio, GenerationRequest, ReferenceImage};
///
/// let frame = ReferenceImage::from_bytes(&[0x89, b'P', b'N', b'G'], "image/png");
/// let request = GenerationRequest::video("A frappe splashing in slow motion", frame)
///     .with_aspect_ratio(AspectRatio::Landscape);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub reference_image: Option<ReferenceImage>,
    pub mode: MediaKind,
    pub aspect_ratio: AspectRatio,
    /// Ignored for images.
    pub resolution: Option<Resolution>,
}

impl GenerationRequest {
    /// A square image request.
    pub fn image(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_image: None,
            mode: MediaKind::Image,
            aspect_ratio: AspectRatio::Square,
            resolution: None,
        }
    }

    /// A portrait 720p video request animating `image`.
    pub fn video(prompt: impl Into<String>, image: ReferenceImage) -> Self {
        Self {
            prompt: prompt.into(),
            reference_image: Some(image),
            mode: MediaKind::Video,
            aspect_ratio: AspectRatio::Portrait,
            resolution: Some(Resolution::P720),
        }
    }

    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_reference_image(mut self, image: ReferenceImage) -> Self {
        self.reference_image = Some(image);
        self
    }

    /// Check the request before anything is sent.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(AdGenError::Validation("Please provide a prompt.".into()));
        }
        match self.mode {
            MediaKind::Image => {
                if self.reference_image.is_some() {
                    return Err(AdGenError::Validation(
                        "image requests do not take a reference image".into(),
                    ));
                }
            }
            MediaKind::Video => match &self.reference_image {
                Some(img) if !img.data.is_empty() => {}
                _ => {
                    return Err(AdGenError::Validation(
                        "Please upload an image and provide a prompt.".into(),
                    ))
                }
            },
        }
        if !self.aspect_ratio.supports(self.mode) {
            return Err(AdGenError::Validation(format!(
                "aspect ratio {} is not supported for {:?} generation",
                self.aspect_ratio, self.mode
            )));
        }
        Ok(())
    }
}

/// Error carried by a finished operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    pub code: Option<i64>,
    pub message: String,
}

/// Snapshot of an asynchronous video operation.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    /// Opaque handle used to request status refreshes.
    pub name: String,
    pub done: bool,
    /// Download link of the first generated video, once done.
    pub video_uri: Option<String>,
    pub error: Option<OperationFailure>,
    /// Number of outputs removed by the service's safety filters.
    pub filtered_count: u32,
}

impl GenerationJob {
    /// Done = terminal. No further polling happens after this.
    pub fn is_terminal(&self) -> bool {
        self.done
    }
}

/// Returned once a workflow completes.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub kind: MediaKind,
    pub data: Vec<u8>,
    pub mime_type: String,
    /// Where the bytes were downloaded from (video only).
    pub source_uri: Option<String>,
    pub model: String,
    /// Wall time from submission to result.
    pub elapsed: Duration,
}

impl GenerationResult {
    /// `data:` URI suitable for inline display.
    pub fn data_uri(&self) -> String {
        encoder::to_data_uri(&self.mime_type, &self.data)
    }

    /// "generated-image.png" or "generated-video.mp4".
    pub fn suggested_filename(&self) -> &'static str {
        match self.kind {
            MediaKind::Image => "generated-image.png",
            MediaKind::Video => "generated-video.mp4",
        }
    }

    /// Write the payload to disk.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::write(path, &self.data)
            .await
            .map_err(AdGenError::Save)
    }
}

// ---------------------------------------------------------------------------
// Wire types (not part of the public API surface)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireImage {
    pub bytes_base64_encoded: String,
    pub mime_type: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PredictRequest<P> {
    pub instances: Vec<WireInstance>,
    pub parameters: P,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireInstance {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<WireImage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutputOptions {
    pub mime_type: String,
}

/// Parameters for `:predict` on the image model.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ImageParameters {
    pub sample_count: u32,
    pub aspect_ratio: String,
    pub output_options: OutputOptions,
}

/// Parameters for `:predictLongRunning` on the video model.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoParameters {
    pub aspect_ratio: String,
    pub resolution: String,
    pub sample_count: u32,
}

/// `:predict` response.
#[derive(Debug, Deserialize)]
pub(crate) struct PredictResponse {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Prediction {
    #[serde(default)]
    pub bytes_base64_encoded: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Long-running operation, as returned by submission and by polling.
#[derive(Debug, Deserialize)]
pub(crate) struct OperationResponse {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub response: Option<OperationResult>,
    #[serde(default)]
    pub error: Option<StatusBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OperationResult {
    #[serde(default)]
    pub generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateVideoResponse {
    #[serde(default)]
    pub generated_samples: Vec<GeneratedSample>,
    #[serde(default)]
    pub rai_media_filtered_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeneratedSample {
    #[serde(default)]
    pub video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoRef {
    #[serde(default)]
    pub uri: Option<String>,
}

/// Google-style `{ "error": { ... } }` envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: StatusBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

impl StatusBody {
    /// First `reason` found in `details`, e.g. "API_KEY_INVALID".
    pub fn reason(&self) -> Option<&str> {
        self.details
            .iter()
            .find_map(|d| d.get("reason").and_then(|r| r.as_str()))
    }
}

impl From<OperationResponse> for GenerationJob {
    fn from(op: OperationResponse) -> Self {
        let video = op.response.and_then(|r| r.generate_video_response);
        let filtered_count = video
            .as_ref()
            .and_then(|v| v.rai_media_filtered_count)
            .unwrap_or(0);
        let video_uri = video.and_then(|v| {
            v.generated_samples
                .into_iter()
                .find_map(|s| s.video.and_then(|v| v.uri).filter(|u| !u.is_empty()))
        });
        GenerationJob {
            name: op.name,
            done: op.done,
            video_uri,
            error: op.error.map(|e| OperationFailure {
                code: e.code,
                message: e.message.unwrap_or_else(|| "unknown error".into()),
            }),
            filtered_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_frame() -> ReferenceImage {
        ReferenceImage::from_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A], "image/png")
    }

    #[test]
    fn test_aspect_ratio_strings() {
        assert_eq!(AspectRatio::Square.as_str(), "1:1");
        assert_eq!(AspectRatio::Portrait.as_str(), "9:16");
        assert_eq!(AspectRatio::Landscape.to_string(), "16:9");
        assert_eq!(Resolution::default().as_str(), "720p");
    }

    #[test]
    fn test_validate_rejects_blank_prompt() {
        let err = GenerationRequest::image("   ").validate().unwrap_err();
        assert!(matches!(err, AdGenError::Validation(_)));
    }

    #[test]
    fn test_validate_video_requires_image() {
        let mut req = GenerationRequest::video("test", png_frame());
        req.reference_image = None;
        assert!(matches!(req.validate(), Err(AdGenError::Validation(_))));
    }

    #[test]
    fn test_validate_aspect_ratio_per_mode() {
        let img = GenerationRequest::image("a red ball").with_aspect_ratio(AspectRatio::Landscape);
        assert!(img.validate().is_err());

        let vid = GenerationRequest::video("go", png_frame()).with_aspect_ratio(AspectRatio::Square);
        assert!(vid.validate().is_err());

        let vid = GenerationRequest::video("go", png_frame()).with_aspect_ratio(AspectRatio::Landscape);
        assert!(vid.validate().is_ok());
    }

    #[test]
    fn test_reference_image_from_data_uri() {
        let img = ReferenceImage::from_data_uri("data:image/jpeg;base64,AQID").unwrap();
        assert_eq!(img.mime_type, "image/jpeg");
        assert_eq!(img.data, "AQID");
    }

    #[test]
    fn test_operation_response_done_with_video() {
        let json = r#"{
            "name": "operations/123",
            "done": true,
            "response": {
                "generateVideoResponse": {
                    "generatedSamples": [{"video": {"uri": "https://example.com/v.mp4"}}]
                }
            }
        }"#;
        let op: OperationResponse = serde_json::from_str(json).unwrap();
        let job = GenerationJob::from(op);
        assert!(job.is_terminal());
        assert_eq!(job.video_uri.as_deref(), Some("https://example.com/v.mp4"));
        assert!(job.error.is_none());
    }

    #[test]
    fn test_operation_response_skips_empty_uri() {
        let json = r#"{
            "name": "operations/124",
            "done": true,
            "response": {"generateVideoResponse": {"generatedSamples": [{"video": {"uri": ""}}]}}
        }"#;
        let op: OperationResponse = serde_json::from_str(json).unwrap();
        assert!(GenerationJob::from(op).video_uri.is_none());
    }

    #[test]
    fn test_operation_response_pending() {
        let op: OperationResponse = serde_json::from_str(r#"{"name": "operations/9"}"#).unwrap();
        let job = GenerationJob::from(op);
        assert!(!job.done);
        assert!(job.video_uri.is_none());
    }

    #[test]
    fn test_status_body_reason() {
        let json = r#"{"error": {"code": 400, "message": "API key not valid.",
            "details": [{"@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "API_KEY_INVALID"}]}}"#;
        let env: ErrorEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.error.reason(), Some("API_KEY_INVALID"));
        assert_eq!(env.error.code, Some(400));
    }

    #[test]
    fn test_video_parameters_serialize_camel_case() {
        let params = VideoParameters {
            aspect_ratio: "9:16".into(),
            resolution: "720p".into(),
            sample_count: 1,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["aspectRatio"], "9:16");
        assert_eq!(json["sampleCount"], 1);
    }

    #[test]
    fn test_result_helpers() {
        let result = GenerationResult {
            kind: MediaKind::Image,
            data: vec![1, 2, 3],
            mime_type: "image/png".into(),
            source_uri: None,
            model: "imagen".into(),
            elapsed: Duration::ZERO,
        };
        assert_eq!(result.data_uri(), "data:image/png;base64,AQID");
        assert_eq!(result.suggested_filename(), "generated-image.png");
    }

    #[tokio::test]
    async fn test_save_failure_is_save_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = GenerationResult {
            kind: MediaKind::Video,
            data: b"mp4".to_vec(),
            mime_type: "video/mp4".into(),
            source_uri: None,
            model: "veo".into(),
            elapsed: Duration::ZERO,
        };

        let err = result
            .save(dir.path().join("missing").join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdGenError::Save(_)));
        assert!(err.outcome().message.starts_with("failed to save result"));

        let target = dir.path().join(result.suggested_filename());
        result.save(&target).await.unwrap();
        assert_eq!(std::fs::read(target).unwrap(), b"mp4");
    }
}
