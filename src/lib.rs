//! # adgen
//!
//! Async Rust client for prompt-driven ad generation: a single square image
//! from a prompt, or a short video animating a product photo. Videos are
//! long-running jobs: submit, poll until done, then download the result --
//! all with idiomatic async Rust.
//!
//! ## Quick start
//!
//! ```no_run
//! use adgen::{Client, GenerationRequest, PollOptions, ReferenceImage};
//!
//! #[tokio::main]
//! async fn main() -> adgen::Result<()> {
//!     let client = Client::builder().api_key("AIza...").build()?;
//!
//!     let image = client
//!         .generate_image(&GenerationRequest::image("A cappuccino frappe, studio lighting"))
//!         .await?;
//!     image.save("frappe.png").await?;
//!
//!     let frame = ReferenceImage::from_path("frappe.png").await?;
//!     let video = client
//!         .generate_video(
//!             &GenerationRequest::video("Ice and coffee beans splash in slow motion", frame),
//!             &PollOptions::default(),
//!         )
//!         .await?;
//!     video.save("frappe.mp4").await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Host integration
//!
//! Applications that own key selection plug in a [`CredentialProvider`] and
//! drive generations through a [`Studio`], which validates input, emits
//! status messages while a video renders and reports rejected keys through a
//! callback.

mod client;
mod credentials;
pub mod encoder;
mod errors;
mod models;
mod progress;
mod studio;

pub use client::{Client, ClientBuilder, PollCallback, PollOptions};
pub use credentials::{CredentialProvider, EnvCredential, StaticCredential, API_KEY_ENV};
pub use errors::{
    classify, AdGenError, ErrorClass, ErrorOutcome, Result, AUTH_FAILURE_MESSAGE,
    AUTH_FAILURE_PATTERNS,
};
pub use models::{
    AspectRatio, GenerationJob, GenerationRequest, GenerationResult, MediaKind, OperationFailure,
    ReferenceImage, Resolution,
};
pub use progress::{
    ProgressTicker, StatusCallback, DEFAULT_STATUS_INTERVAL, DEFAULT_STATUS_MESSAGES,
};
pub use studio::{KeyInvalidCallback, Studio, StudioBuilder};

// Re-exported so callers can cancel without depending on tokio-util directly.
pub use tokio_util::sync::CancellationToken;
