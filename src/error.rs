use thiserror::Error;

/// Library error type for the acquisition and display pipeline.
///
/// See [`Error::is_connectivity`] and [`Error::is_credential_fatal`] for how
/// the slideshow branches on them.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed credential material or settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure (DNS, refused connection, timeout, reset).
    #[error("connection failed during {operation}: {message}")]
    Connectivity { operation: String, message: String },

    /// The catalog connectivity ceiling was reached.
    #[error("maximum connection attempts exceeded ({attempts}): {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// The service answered 401 for the current access token.
    #[error("request unauthorized")]
    Unauthorized,

    /// The service still answered 401 after a successful renewal.
    #[error("access token rejected again after renewal")]
    AuthenticationFailed,

    /// The token endpoint rejected the refresh credential.
    #[error("refresh token is invalid or expired: {0}")]
    InvalidGrant(String),

    /// Any non-2xx response other than 401.
    #[error("{operation} failed with HTTP {status}: {body}")]
    Http {
        operation: String,
        status: u16,
        body: String,
    },

    /// The downloaded bytes are not a supported image.
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// The scaled image is too short to cover the display.
    #[error("scaled image is {width}x{height}, shorter than the {target_height}px display")]
    FrameSize {
        width: u32,
        height: u32,
        target_height: u32,
    },

    /// The display sink refused or could not accept a frame.
    #[error("display error: {0}")]
    Display(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn connectivity(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Connectivity {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// No further renewal is possible once one of these is seen.
    pub fn is_credential_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::InvalidGrant(_))
    }
}
