use thiserror::Error;

/// Substrings the generation service uses in messages about a bad or
/// unauthorised API key.
pub const AUTH_FAILURE_PATTERNS: &[&str] = &["API key not valid", "Requested entity was not found"];

/// Structured error reason the service attaches to invalid keys.
pub(crate) const API_KEY_INVALID_REASON: &str = "API_KEY_INVALID";

/// Message shown to the user whenever the credential is rejected.
pub const AUTH_FAILURE_MESSAGE: &str =
    "API Key validation failed. Please select a valid API key and try again.";

/// How a failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network hiccup, rate limit or server-side failure.
    Transient,
    /// The credential was rejected; the host should re-run key selection.
    AuthFailure,
    /// Anything else.
    Unknown,
}

/// All errors that can occur while generating media.
#[derive(Error, Debug)]
pub enum AdGenError {
    /// Required input is missing or not allowed for the requested mode.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The reference media could not be read.
    #[error("failed to read media: {0}")]
    Encoding(#[from] std::io::Error),

    /// Writing a result to disk failed.
    #[error("failed to save result: {0}")]
    Save(#[source] std::io::Error),

    /// The generation, submission or polling call failed.
    #[error("{message}")]
    Remote {
        status: Option<u16>,
        message: String,
        classification: ErrorClass,
    },

    /// The image call succeeded but produced no image.
    #[error("image generation failed to produce an image")]
    EmptyResult,

    /// The video job finished without a usable download link.
    #[error("video generation completed, but no download link was found: {0}")]
    MissingResult(String),

    /// Downloading the finished video failed.
    #[error("failed to fetch result: {message}")]
    Fetch { status: Option<u16>, message: String },

    /// Base64 payload could not be decoded.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// No API key is available, or key selection failed.
    #[error("credential unavailable: {0}")]
    Credential(String),

    /// The workflow was cancelled by the caller before completing.
    #[error("generation cancelled")]
    Cancelled,
}

impl AdGenError {
    /// Build a [`AdGenError::Remote`] from a service message, classifying it.
    pub(crate) fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let classification = classify(status, &message, None);
        Self::Remote {
            status,
            message,
            classification,
        }
    }

    /// Transport failure while talking to the generation service.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        let classification = if err.is_timeout() || err.is_connect() {
            ErrorClass::Transient
        } else {
            ErrorClass::Unknown
        };
        Self::Remote {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
            classification,
        }
    }

    /// Classification of this error.
    pub fn classification(&self) -> ErrorClass {
        match self {
            Self::Remote { classification, .. } => *classification,
            Self::Credential(_) => ErrorClass::AuthFailure,
            Self::Fetch { status, .. } => match status {
                Some(s) if *s == 429 || *s >= 500 => ErrorClass::Transient,
                _ => ErrorClass::Unknown,
            },
            _ => ErrorClass::Unknown,
        }
    }

    /// `true` if the host should discard the credential and re-select a key.
    pub fn is_auth_failure(&self) -> bool {
        self.classification() == ErrorClass::AuthFailure
    }

    /// Convert into the message and classification shown to the user.
    pub fn outcome(&self) -> ErrorOutcome {
        let classification = self.classification();
        let message = if classification == ErrorClass::AuthFailure {
            AUTH_FAILURE_MESSAGE.to_string()
        } else {
            self.to_string()
        };
        ErrorOutcome {
            message,
            classification,
        }
    }
}

/// User-facing summary of a failed workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorOutcome {
    pub message: String,
    pub classification: ErrorClass,
}

impl std::fmt::Display for ErrorOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<AdGenError> for ErrorOutcome {
    fn from(err: AdGenError) -> Self {
        err.outcome()
    }
}

/// Classify a remote failure.
///
/// A structured `reason` from the service wins; otherwise HTTP status and then
/// the message text are consulted.
pub fn classify(status: Option<u16>, message: &str, reason: Option<&str>) -> ErrorClass {
    if reason == Some(API_KEY_INVALID_REASON) || status == Some(401) {
        return ErrorClass::AuthFailure;
    }
    if AUTH_FAILURE_PATTERNS.iter().any(|p| message.contains(p)) {
        return ErrorClass::AuthFailure;
    }
    match status {
        Some(s) if s == 429 || s >= 500 => ErrorClass::Transient,
        _ => ErrorClass::Unknown,
    }
}

/// A convenience alias for `Result<T, AdGenError>`.
pub type Result<T> = std::result::Result<T, AdGenError>;
