//! Error taxonomy for collaborator boundaries and commit sub-steps.
//!
//! DESIGN
//! ======
//! Each collaborator boundary gets its own enum so callers can decide between
//! the fatal path (notify + cancel) and the recoverable path (silent fallback)
//! by matching, never by catching. `CommitFailure` is the discriminated result
//! of the multi-step commit pipeline.

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;

/// Grepable error code and retryable flag for notices and logs.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// CONTENT
// =============================================================================

/// Errors from resolving or materializing an asset.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// Premium-tier asset requested without an authenticated session.
    #[error("premium asset requires sign-in: {0}")]
    AuthRequired(String),

    /// The entry carries no path that could be resolved.
    #[error("asset has no resolvable path: {0}")]
    MissingPath(String),

    /// The entry path escapes the cache root.
    #[error("unsafe asset path: {0}")]
    UnsafePath(String),

    /// The remote responded with a non-success status.
    #[error("remote responded with status {status} for {url}")]
    Status { status: u16, url: String },

    /// The remote response could not be interpreted.
    #[error("unexpected remote response: {0}")]
    BadResponse(String),

    /// The HTTP request itself failed.
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Writing or probing the local cache failed.
    #[error("cache io failed: {0}")]
    Io(#[from] std::io::Error),

    /// The content service is missing or has invalid configuration.
    #[error("content service misconfigured: {0}")]
    Config(String),
}

impl ErrorCode for ContentError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::AuthRequired(_) => "E_AUTH_REQUIRED",
            Self::MissingPath(_) => "E_MISSING_PATH",
            Self::UnsafePath(_) => "E_UNSAFE_PATH",
            Self::Status { .. } => "E_REMOTE_STATUS",
            Self::BadResponse(_) => "E_BAD_RESPONSE",
            Self::Http(_) => "E_HTTP",
            Self::Io(_) => "E_CACHE_IO",
            Self::Config(_) => "E_CONTENT_CONFIG",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

/// Errors from the entity store and entity factory.
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    /// The referenced entity no longer exists.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// Importing an entity from a compendium pack failed.
    #[error("compendium import failed for {id}: {message}")]
    Import { id: String, message: String },

    /// Creating or updating an entity or instance failed.
    #[error("entity store write failed: {0}")]
    Write(String),
}

impl ErrorCode for EntityError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_ENTITY_NOT_FOUND",
            Self::Import { .. } => "E_IMPORT",
            Self::Write(_) => "E_STORE_WRITE",
        }
    }
}

// =============================================================================
// FORMULAS / HP
// =============================================================================

/// Errors from dice-formula evaluation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,
    #[error("unexpected '{found}' at position {pos}")]
    Unexpected { found: String, pos: usize },
    #[error("dice term out of range: {0}")]
    OutOfRange(String),
    #[error("formula result overflowed")]
    Overflow,
}

/// Errors from deriving an HP override.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HpError {
    /// Static input is not a positive integer or `low-high` range.
    #[error("invalid HP value '{0}': use a positive number or a range like 20-85")]
    InvalidStatic(String),

    /// Percentage outside `[0, 500]` or not finite.
    #[error("invalid HP percentage: {0}")]
    InvalidPercent(f64),

    /// Dice formula could not be evaluated.
    #[error("HP formula failed: {0}")]
    Formula(#[from] FormulaError),
}

impl ErrorCode for HpError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidStatic(_) => "E_HP_STATIC",
            Self::InvalidPercent(_) => "E_HP_PERCENT",
            Self::Formula(_) => "E_HP_FORMULA",
        }
    }
}

// =============================================================================
// COMMIT
// =============================================================================

/// Discriminated failure of one commit attempt.
#[derive(Debug, thiserror::Error)]
pub enum CommitFailure {
    /// Asset could not be resolved or downloaded. Fatal to the session.
    #[error("asset download failed: {0}")]
    Download(#[from] ContentError),

    /// Compendium import failed. Fatal to this attempt only.
    #[error("could not import bound entity: {0}")]
    Import(EntityError),

    /// Entity or instance creation failed. Fatal to the session.
    #[error("could not create placement: {0}")]
    Factory(EntityError),
}

impl CommitFailure {
    /// Whether this failure ends the session.
    #[must_use]
    pub fn fatal(&self) -> bool {
        !matches!(self, Self::Import(_))
    }
}

impl ErrorCode for CommitFailure {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Download(_) => "E_DOWNLOAD",
            Self::Import(_) => "E_IMPORT",
            Self::Factory(_) => "E_FACTORY",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Download(e) => e.retryable(),
            Self::Import(_) => true,
            Self::Factory(_) => false,
        }
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// The placement controller task is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("placement controller has shut down")]
pub struct ControllerClosed;

impl ErrorCode for ControllerClosed {
    fn error_code(&self) -> &'static str {
        "E_CONTROLLER_CLOSED"
    }
}
