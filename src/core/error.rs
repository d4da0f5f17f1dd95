use thiserror::Error;

use crate::core::catalog::Category;

/// Outcome of a single remote generation call.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Why a remote generation call produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The service rejected the credential (HTTP 401).
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// Anything else the service (or the transport) reported.
    #[error("service error: {0}")]
    Service(String),
}

impl GenerationError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, GenerationError::Authentication(_))
    }

    /// Message shown to the user when this failure is replaced by a placeholder.
    pub fn notice(&self) -> String {
        match self {
            GenerationError::Authentication(_) => {
                "An authentication error occurred. Please check your API key.".to_string()
            }
            GenerationError::Service(message) => format!("An API error occurred: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown category: {0}")]
    UnknownCategory(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("`{value}` is not a valid {category}")]
    InvalidOption { category: Category, value: String },
    #[error("no {0} was chosen")]
    MissingChoice(Category),
    #[error("no age was given")]
    MissingAge,
    #[error("age {0} is outside 3..=12")]
    AgeOutOfRange(u8),
    #[error("an image style is required when images are generated")]
    MissingImageStyle,
    #[error("`{0}` is not a supported image style")]
    InvalidImageStyle(String),
}
