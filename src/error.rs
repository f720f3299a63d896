//! Error types for the media library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the media library.
#[derive(Error, Debug)]
pub enum Error {
    // Preflight errors
    #[error("ffprobe not found at '{0}'. Install FFmpeg: sudo apt install ffmpeg")]
    FfprobeNotFound(String),

    #[error("TMDB bearer token not configured. Set TMDB_BEARER_TOKEN or [tmdb].bearer_token")]
    TmdbTokenMissing,

    // File system errors
    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    // Probe errors
    #[error("ffprobe failed for {path}: {message}")]
    Probe { path: String, message: String },

    #[error("ffprobe exited with status {status}: {stderr}")]
    ProbeExit { status: i32, stderr: String },

    // Catalog errors
    #[error("TMDB API error: {message} (status: {status}, code: {code:?})")]
    Catalog {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    // Store errors
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Entity not found: {0}")]
    MissingEntity(String),

    // Scheduler errors
    #[error("Invalid interval '{interval}': {reason}")]
    InvalidInterval { interval: String, reason: String },

    #[error("Invalid task config for '{task}': {reason}")]
    InvalidTaskConfig { task: String, reason: String },

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Operation cancelled")]
    Cancelled,

    // Config errors
    #[error("Invalid config file {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a string.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Wrap this error with a description of the operation that failed.
    pub fn context<S: Into<String>>(self, context: S) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the failure came from the network rather than the remote service.
    ///
    /// Provider-reported errors (`Catalog`) are not transient: retrying the same
    /// request yields the same answer.
    pub fn is_transient(&self) -> bool {
        match self.root() {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Whether the error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled)
    }
}

/// Attach context to errors at layer boundaries.
pub trait ResultExt<T> {
    fn context<S: Into<String>>(self, context: S) -> Result<T>;

    fn with_context<S: Into<String>, F: FnOnce() -> S>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context<S: Into<String>>(self, context: S) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<S: Into<String>, F: FnOnce() -> S>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().context(f()))
    }
}
