//! Workflow boundary between a host UI and the [`Client`].
//!
//! A [`Studio`] validates input before anything is sent, runs the status
//! ticker while a video renders, and reports rejected credentials back to the
//! host through a single callback so it can re-run key selection.

use std::sync::Arc;
use std::time::Duration;

use crate::client::{Client, PollOptions};
use crate::credentials::CredentialProvider;
use crate::errors::{AdGenError, ErrorOutcome, Result};
use crate::models::{GenerationRequest, GenerationResult, MediaKind};
use crate::progress::{self, ProgressTicker, StatusCallback, DEFAULT_STATUS_INTERVAL};

/// Called when the service rejects the credential.
pub type KeyInvalidCallback = Box<dyn Fn() + Send + Sync>;

/// Builder for [`Studio`].
pub struct StudioBuilder {
    client: Option<Client>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    on_key_invalid: Option<KeyInvalidCallback>,
    on_status: Option<StatusCallback>,
    status_interval: Duration,
    status_messages: Vec<String>,
}

impl StudioBuilder {
    pub fn new() -> Self {
        Self {
            client: None,
            credentials: None,
            on_key_invalid: None,
            on_status: None,
            status_interval: DEFAULT_STATUS_INTERVAL,
            status_messages: progress::default_messages(),
        }
    }

    /// The client to drive. Its credential provider is also used for
    /// [`Studio::ensure_credential`] unless [`credentials`](Self::credentials)
    /// is set.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Host key store. Replaces the client's provider, so key selection and
    /// every request go through the same source.
    pub fn credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Invoked once per failed run whose error classifies as an auth failure.
    pub fn on_key_invalid(mut self, cb: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_key_invalid = Some(Box::new(cb));
        self
    }

    /// Receives the cycling status messages during video runs.
    pub fn on_status(mut self, cb: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Arc::new(cb));
        self
    }

    /// Defaults to 5 seconds. Clamped to at least 1 ms.
    pub fn status_interval(mut self, d: Duration) -> Self {
        self.status_interval = d;
        self
    }

    pub fn status_messages(mut self, messages: Vec<String>) -> Self {
        self.status_messages = messages;
        self
    }

    /// Build the [`Studio`]. Without an explicit client, one is built from the
    /// environment via [`Client::builder`].
    pub fn build(self) -> Result<Studio> {
        let mut client = match self.client {
            Some(c) => c,
            None => match &self.credentials {
                Some(p) => Client::builder().credentials(Arc::clone(p)).build()?,
                None => Client::builder().build()?,
            },
        };
        if let Some(p) = self.credentials {
            client.set_credentials(p);
        }
        Ok(Studio {
            client,
            on_key_invalid: self.on_key_invalid,
            on_status: self.on_status,
            status_interval: self.status_interval,
            status_messages: self.status_messages,
        })
    }
}

impl Default for StudioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one generation at a time on behalf of a host application.
///
/// # Example
///
/// ```no_run
/// use adgen::{Client, GenerationRequest, PollOptions, ReferenceImage, Studio};
///
/// # async fn example() -> adgen::Result<()> {
/// let studio = Studio::builder()
///     .client(Client::builder().api_key("AIza...").build()?)
///     .on_key_invalid(|| eprintln!("please pick another key"))
///     .on_status(|msg| println!("{msg}"))
///     .build()?;
///
/// let frame = ReferenceImage::from_path("frappe.png").await?;
/// let request = GenerationRequest::video("An energetic coffee ad", frame);
/// match studio.run(&request, &PollOptions::default()).await {
///     Ok(video) => video.save(video.suggested_filename()).await?,
///     Err(err) => eprintln!("{}", err.outcome()),
/// }
/// # Ok(())
/// # }
/// ```
pub struct Studio {
    client: Client,
    on_key_invalid: Option<KeyInvalidCallback>,
    on_status: Option<StatusCallback>,
    status_interval: Duration,
    status_messages: Vec<String>,
}

impl Studio {
    pub fn builder() -> StudioBuilder {
        StudioBuilder::new()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn credentials(&self) -> &Arc<dyn CredentialProvider> {
        self.client.credentials()
    }

    /// Make sure a key is selected, opening the host's key selection if not.
    ///
    /// Selection is treated as successful as soon as the host's dialog
    /// returns without error.
    pub async fn ensure_credential(&self) -> Result<()> {
        if self.credentials().has_selected_key().await {
            return Ok(());
        }
        log::info!("no API key selected, opening key selection");
        self.credentials().open_key_selection().await
    }

    /// Run one generation from validation to result.
    ///
    /// Nothing is sent if validation fails. On an auth failure the
    /// `on_key_invalid` callback fires once before the error is returned.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        opts: &PollOptions,
    ) -> Result<GenerationResult> {
        let result = self.execute(request, opts).await;

        if let Err(ref err) = result {
            log::error!("generation failed: {err}");
            if err.is_auth_failure() {
                if let Some(ref cb) = self.on_key_invalid {
                    cb();
                }
            }
        }

        result
    }

    /// [`run`](Self::run), with the error already converted for display.
    pub async fn run_outcome(
        &self,
        request: &GenerationRequest,
        opts: &PollOptions,
    ) -> std::result::Result<GenerationResult, ErrorOutcome> {
        self.run(request, opts).await.map_err(ErrorOutcome::from)
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        opts: &PollOptions,
    ) -> Result<GenerationResult> {
        request.validate()?;

        match request.mode {
            MediaKind::Image => self.client.generate_image(request).await,
            MediaKind::Video => {
                // Stops on every exit path when dropped.
                let _ticker = self.on_status.clone().map(|cb| {
                    ProgressTicker::start(self.status_messages.clone(), self.status_interval, cb)
                });
                self.client.generate_video(request, opts).await
            }
        }
    }
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Studio")
            .field("status_interval", &self.status_interval)
            .field("status_messages", &self.status_messages.len())
            .finish_non_exhaustive()
    }
}

impl From<Client> for Studio {
    fn from(client: Client) -> Self {
        Self {
            client,
            on_key_invalid: None,
            on_status: None,
            status_interval: DEFAULT_STATUS_INTERVAL,
            status_messages: progress::default_messages(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn studio_with_counter() -> (Studio, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let studio = Studio::builder()
            .client(Client::builder().api_key("k").base_url("http://127.0.0.1:9").build().unwrap())
            .on_key_invalid(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        (studio, calls)
    }

    #[tokio::test]
    async fn test_validation_error_does_not_signal_key() {
        let (studio, calls) = studio_with_counter();
        let err = studio
            .run(&GenerationRequest::image(""), &PollOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdGenError::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_outcome_converts_error() {
        let (studio, _) = studio_with_counter();
        let outcome = studio
            .run_outcome(&GenerationRequest::image("  "), &PollOptions::default())
            .await
            .unwrap_err();
        assert_eq!(outcome.message, "invalid request: Please provide a prompt.");
    }

    #[tokio::test]
    async fn test_ensure_credential_with_key_present() {
        let (studio, _) = studio_with_counter();
        assert!(studio.ensure_credential().await.is_ok());
    }

    #[tokio::test]
    async fn test_builder_credentials_replace_client_provider() {
        use crate::credentials::StaticCredential;

        let studio = Studio::builder()
            .client(Client::builder().api_key("").build().unwrap())
            .credentials(Arc::new(StaticCredential::new("host-key")))
            .build()
            .unwrap();
        assert_eq!(studio.credentials().api_key().as_deref(), Some("host-key"));
        assert!(studio.ensure_credential().await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_credential_without_selection_support() {
        let studio = Studio::from(Client::builder().api_key("").build().unwrap());
        assert!(matches!(
            studio.ensure_credential().await,
            Err(AdGenError::Credential(_))
        ));
    }
}
