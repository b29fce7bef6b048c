use thiserror::Error;

pub type CloakResult<T> = Result<T, CloakError>;

/// Operation-level error taxonomy.
///
/// The split matters to callers: `InvalidName`/`InvalidSize` mark foreign or
/// corrupted entries that listings silently filter, `Integrity` marks
/// tampered ciphertext (distinct from a transport failure), and `NotFound`
/// drives the second attempt of the path resolver's guess-and-retry.
#[derive(Debug, Error)]
pub enum CloakError {
    #[error("config error: {0}")]
    Config(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("not a valid encrypted name: {0}")]
    InvalidName(String),

    #[error("not a valid encrypted size: {0}")]
    InvalidSize(u64),

    #[error("ciphertext integrity failure: {0}")]
    Integrity(String),

    #[error("remote link exposes no random-access capability")]
    NoCapability,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CloakError {
    /// True for the remote's "no such object" answer, which is the only
    /// error the path resolver retries on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloakError::NotFound(_))
    }

    /// True for errors that mean "this entry is not a well-formed overlay
    /// member" rather than "the operation failed".
    pub fn is_decode(&self) -> bool {
        matches!(self, CloakError::InvalidName(_) | CloakError::InvalidSize(_))
    }
}

impl From<CloakError> for std::io::Error {
    fn from(err: CloakError) -> Self {
        match err {
            CloakError::Io(io) => io,
            CloakError::Integrity(_) => {
                std::io::Error::new(std::io::ErrorKind::InvalidData, err)
            }
            CloakError::NotFound(_) => std::io::Error::new(std::io::ErrorKind::NotFound, err),
            other => std::io::Error::other(other),
        }
    }
}
