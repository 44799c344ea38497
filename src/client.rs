use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::credentials::{CredentialProvider, EnvCredential, StaticCredential, API_KEY_ENV};
use crate::encoder;
use crate::errors::{classify, AdGenError, ErrorClass, Result};
use crate::models::{
    ErrorEnvelope, GenerationJob, GenerationRequest, GenerationResult, ImageParameters,
    MediaKind, OperationResponse, OutputOptions, PredictRequest, PredictResponse, VideoParameters,
    WireImage, WireInstance,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const API_KEY_HEADER: &str = "x-goog-api-key";
const IMAGE_MIME: &str = "image/png";
const VIDEO_MIME: &str = "video/mp4";

/// Callback invoked with every refreshed job while polling.
pub type PollCallback = Box<dyn Fn(&GenerationJob) + Send + Sync>;

/// Polling config for [`Client::generate_video`] / [`Client::wait_for_job`].
#[derive(Default)]
pub struct PollOptions {
    /// Overrides the client's poll interval.
    pub poll_interval: Option<Duration>,
    /// Checked before every wait; cancelling ends the workflow with
    /// [`AdGenError::Cancelled`].
    pub cancel: Option<CancellationToken>,
    /// Called after each status refresh.
    pub on_poll: Option<PollCallback>,
}

impl PollOptions {
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn on_poll(mut self, cb: impl Fn(&GenerationJob) + Send + Sync + 'static) -> Self {
        self.on_poll = Some(Box::new(cb));
        self
    }
}

/// Builder for constructing a [`Client`] with custom configuration.
///
/// # Example
///
/// ```no_run
/// use adgen::ClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> adgen::Result<()> {
/// let client = ClientBuilder::new()
///     .api_key("AIza...")
///     .video_model("veo-3.1-generate-preview")
///     .poll_interval(Duration::from_secs(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    credentials: Option<Arc<dyn CredentialProvider>>,
    base_url: String,
    image_model: String,
    video_model: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl ClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            credentials: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            video_model: DEFAULT_VIDEO_MODEL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use a fixed API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.credentials = Some(Arc::new(StaticCredential::new(key)));
        self
    }

    /// Use a host-supplied credential provider. The key is fetched from it on
    /// every request.
    pub fn credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Override the base URL (defaults to `https://generativelanguage.googleapis.com`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Defaults to `imagen-4.0-generate-001`.
    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    /// Defaults to `veo-3.1-fast-generate-preview`.
    pub fn video_model(mut self, model: impl Into<String>) -> Self {
        self.video_model = model.into();
        self
    }

    /// Delay between job status checks (defaults to 10 seconds).
    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    /// Set the HTTP request timeout (defaults to 60 seconds).
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    /// Build the [`Client`].
    ///
    /// If no key or provider was set, the builder falls back to the `API_KEY`
    /// environment variable. Returns [`AdGenError::Credential`] if that is unset.
    pub fn build(self) -> Result<Client> {
        let credentials = match self.credentials {
            Some(c) => c,
            None => {
                let env = EnvCredential::default();
                if env.api_key().is_none() {
                    return Err(AdGenError::Credential(format!(
                        "API key is required. Pass it to ClientBuilder::api_key() \
                         or set the {API_KEY_ENV} environment variable."
                    )));
                }
                Arc::new(env)
            }
        };

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(AdGenError::transport)?;

        Ok(Client {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            credentials,
            http,
            image_model: self.image_model,
            video_model: self.video_model,
            poll_interval: self.poll_interval,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Client for the image and video generation service.
///
/// # Example
///
/// ```no_run
/// use adgen::{Client, GenerationRequest};
///
/// # async fn example() -> adgen::Result<()> {
/// let client = Client::builder().api_key("AIza...").build()?;
/// let image = client
///     .generate_image(&GenerationRequest::image("A red ball"))
///     .await?;
/// image.save(image.suggested_filename()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    http: reqwest::Client,
    image_model: String,
    video_model: String,
    poll_interval: Duration,
}

impl Client {
    /// Shorthand for [`ClientBuilder::new`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The credential provider in use.
    pub fn credentials(&self) -> &Arc<dyn CredentialProvider> {
        &self.credentials
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub(crate) fn set_credentials(&mut self, provider: Arc<dyn CredentialProvider>) {
        self.credentials = provider;
    }

    /// Generate a single square PNG in one round trip.
    ///
    /// # Errors
    ///
    /// - [`AdGenError::Validation`] for a blank prompt or a non-square ratio.
    /// - [`AdGenError::Remote`] if the call fails.
    /// - [`AdGenError::EmptyResult`] if the service returns no image.
    pub async fn generate_image(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        request.validate()?;
        if request.mode != MediaKind::Image {
            return Err(AdGenError::Validation(
                "generate_image needs an image request".into(),
            ));
        }
        let start = Instant::now();

        let body = PredictRequest {
            instances: vec![WireInstance {
                prompt: request.prompt.clone(),
                image: None,
            }],
            parameters: ImageParameters {
                sample_count: 1,
                aspect_ratio: request.aspect_ratio.as_str().to_string(),
                output_options: OutputOptions {
                    mime_type: IMAGE_MIME.to_string(),
                },
            },
        };

        let path = format!("/v1beta/models/{}:predict", self.image_model);
        let resp: PredictResponse = self.post(&path, &body).await?;

        let (b64, mime_type) = resp
            .predictions
            .into_iter()
            .find_map(|p| {
                p.bytes_base64_encoded
                    .filter(|b| !b.is_empty())
                    .map(|b| (b, p.mime_type))
            })
            .ok_or(AdGenError::EmptyResult)?;
        let data = encoder::decode(&b64)?;

        log::info!(
            "image generated with {} ({} bytes)",
            self.image_model,
            data.len()
        );

        Ok(GenerationResult {
            kind: MediaKind::Image,
            data,
            mime_type: mime_type.unwrap_or_else(|| IMAGE_MIME.to_string()),
            source_uri: None,
            model: self.image_model.clone(),
            elapsed: start.elapsed(),
        })
    }

    /// Submit a video job and return immediately with its first snapshot.
    ///
    /// The returned [`GenerationJob`] is typically not yet done. Use
    /// [`wait_for_job`](Self::wait_for_job) to drive it, or
    /// [`generate_video`](Self::generate_video) for the full workflow.
    pub async fn submit_video(&self, request: &GenerationRequest) -> Result<GenerationJob> {
        request.validate()?;
        let image = match (&request.mode, &request.reference_image) {
            (MediaKind::Video, Some(img)) => img,
            _ => {
                return Err(AdGenError::Validation(
                    "submit_video needs a video request with a reference image".into(),
                ))
            }
        };

        let body = PredictRequest {
            instances: vec![WireInstance {
                prompt: request.prompt.clone(),
                image: Some(WireImage {
                    bytes_base64_encoded: encoder::strip_data_uri_prefix(&image.data).to_string(),
                    mime_type: image.mime_type.clone(),
                }),
            }],
            parameters: VideoParameters {
                aspect_ratio: request.aspect_ratio.as_str().to_string(),
                resolution: request
                    .resolution
                    .unwrap_or_default()
                    .as_str()
                    .to_string(),
                sample_count: 1,
            },
        };

        let path = format!("/v1beta/models/{}:predictLongRunning", self.video_model);
        let op: OperationResponse = self.post(&path, &body).await?;
        let job = GenerationJob::from(op);
        log::info!("video job submitted: {} (done={})", job.name, job.done);
        Ok(job)
    }

    /// Fetch the current state of a job by its handle.
    pub async fn get_operation(&self, name: &str) -> Result<GenerationJob> {
        let path = format!("/v1beta/{}", name.trim_start_matches('/'));
        let op: OperationResponse = self.get(&path).await?;
        Ok(GenerationJob::from(op))
    }

    /// Poll `job` until the service reports it done.
    ///
    /// Each refresh uses the handle from the latest response and replaces the
    /// job wholesale. There is no attempt limit: the loop ends when the job is
    /// done, a call fails, or `opts.cancel` fires.
    pub async fn wait_for_job(
        &self,
        mut job: GenerationJob,
        opts: &PollOptions,
    ) -> Result<GenerationJob> {
        let interval = opts.poll_interval.unwrap_or(self.poll_interval);
        let start = Instant::now();

        while !job.done {
            if let Some(token) = &opts.cancel {
                if token.is_cancelled() {
                    return Err(AdGenError::Cancelled);
                }
                tokio::select! {
                    _ = token.cancelled() => return Err(AdGenError::Cancelled),
                    _ = tokio::time::sleep(interval) => {}
                }
            } else {
                tokio::time::sleep(interval).await;
            }

            job = self.get_operation(&job.name).await?;
            log::debug!(
                "polled {} after {}s (done={})",
                job.name,
                start.elapsed().as_secs(),
                job.done
            );

            if let Some(ref cb) = opts.on_poll {
                cb(&job);
            }
        }

        Ok(job)
    }

    /// Submit a video job, poll it to completion and download the result.
    ///
    /// # Errors
    ///
    /// - [`AdGenError::Validation`] if the request has no prompt or reference image.
    /// - [`AdGenError::Remote`] if submission or any poll fails, or the job
    ///   finishes with an error.
    /// - [`AdGenError::MissingResult`] if the finished job has no video link.
    /// - [`AdGenError::Fetch`] if the download fails.
    /// - [`AdGenError::Cancelled`] if `opts.cancel` fires.
    pub async fn generate_video(
        &self,
        request: &GenerationRequest,
        opts: &PollOptions,
    ) -> Result<GenerationResult> {
        let start = Instant::now();
        let job = self.submit_video(request).await?;
        let job = self.wait_for_job(job, opts).await?;
        let uri = self.video_uri(job)?;

        log::info!("video ready after {}s", start.elapsed().as_secs());
        let data = self.fetch_result(&uri).await?;

        Ok(GenerationResult {
            kind: MediaKind::Video,
            data,
            mime_type: VIDEO_MIME.to_string(),
            source_uri: Some(uri),
            model: self.video_model.clone(),
            elapsed: start.elapsed(),
        })
    }

    /// Download a finished video. The credential is appended as the `key`
    /// query parameter. No retry.
    pub async fn fetch_result(&self, uri: &str) -> Result<Vec<u8>> {
        let mut url = Url::parse(uri).map_err(|e| AdGenError::Fetch {
            status: None,
            message: format!("invalid result URI {uri}: {e}"),
        })?;
        url.query_pairs_mut().append_pair("key", &self.api_key()?);

        log::debug!("fetching result from {}", redact(uri));
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AdGenError::Fetch {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AdGenError::Fetch {
                status: Some(status.as_u16()),
                message: if text.is_empty() {
                    status.to_string()
                } else {
                    text
                },
            });
        }

        let bytes = response.bytes().await.map_err(|e| AdGenError::Fetch {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn api_key(&self) -> Result<String> {
        self.credentials
            .api_key()
            .ok_or_else(|| AdGenError::Credential("no API key selected".into()))
    }

    /// Pull the download link out of a finished job.
    fn video_uri(&self, job: GenerationJob) -> Result<String> {
        if let Some(err) = job.error {
            let status = err.code.and_then(|c| u16::try_from(c).ok());
            return Err(AdGenError::remote(status, err.message));
        }
        match job.video_uri {
            Some(uri) => Ok(uri),
            None if job.filtered_count > 0 => {
                log::warn!("job {} output removed by safety filters", job.name);
                Err(AdGenError::MissingResult(format!(
                    "{} video(s) removed by safety filters",
                    job.filtered_count
                )))
            }
            None => Err(AdGenError::MissingResult(format!(
                "job {} returned no video",
                job.name
            ))),
        }
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("POST {url}");
        let req = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, self.api_key()?)
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        self.send(req).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {url}");
        let req = self.http.get(&url).header(API_KEY_HEADER, self.api_key()?);
        self.send(req).await
    }

    /// Send once and map failures to classified [`AdGenError::Remote`] errors.
    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = req.send().await.map_err(AdGenError::transport)?;
        let status = response.status();

        if status.is_success() {
            return response.json().await.map_err(AdGenError::transport);
        }

        let status_code = status.as_u16();
        let text = response.text().await.unwrap_or_default();
        let (message, reason) = match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(env) => {
                let reason = env.error.reason().map(str::to_string);
                (env.error.message.unwrap_or_else(|| text.clone()), reason)
            }
            Err(_) if text.is_empty() => (status.to_string(), None),
            Err(_) => (text, None),
        };

        let classification = classify(Some(status_code), &message, reason.as_deref());
        if classification == ErrorClass::AuthFailure {
            log::warn!("credential rejected ({status_code}): {message}");
        }

        Err(AdGenError::Remote {
            status: Some(status_code),
            message,
            classification,
        })
    }
}

/// Strip the query string so download tokens don't end up in logs.
fn redact(uri: &str) -> &str {
    uri.split('?').next().unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_with_explicit_key() {
        let client = ClientBuilder::new().api_key("test-key").build().unwrap();
        assert_eq!(client.api_key().unwrap(), "test-key");
        assert_eq!(client.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_builder_trims_base_url() {
        let client = ClientBuilder::new()
            .api_key("k")
            .base_url("http://localhost:9000/")
            .build()
            .unwrap();
        assert_eq!(client.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_builder_requires_key_without_env() {
        if std::env::var(API_KEY_ENV).is_err() {
            let result = ClientBuilder::new().build();
            assert!(matches!(result, Err(AdGenError::Credential(_))));
        }
    }

    #[test]
    fn test_redact_drops_query() {
        assert_eq!(
            redact("https://x.test/files/a:download?alt=media&key=secret"),
            "https://x.test/files/a:download"
        );
    }

    #[test]
    fn test_video_uri_prefers_error() {
        let client = ClientBuilder::new().api_key("k").build().unwrap();
        let job = GenerationJob {
            name: "operations/1".into(),
            done: true,
            video_uri: None,
            error: Some(crate::models::OperationFailure {
                code: Some(404),
                message: "Requested entity was not found.".into(),
            }),
            filtered_count: 0,
        };
        let err = client.video_uri(job).unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_video_uri_missing_mentions_filter() {
        let client = ClientBuilder::new().api_key("k").build().unwrap();
        let job = GenerationJob {
            name: "operations/1".into(),
            done: true,
            video_uri: None,
            error: None,
            filtered_count: 1,
        };
        match client.video_uri(job) {
            Err(AdGenError::MissingResult(msg)) => assert!(msg.contains("safety")),
            other => panic!("expected MissingResult, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_video_rejects_image_request() {
        let client = ClientBuilder::new().api_key("k").build().unwrap();
        let err = client
            .submit_video(&GenerationRequest::image("a cat"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdGenError::Validation(_)));
    }
}
