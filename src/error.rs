use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriplebindError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Unknown attribute '{attribute}' on model '{model}'")]
    UnknownAttribute { model: String, attribute: String },
    #[error("Type mismatch on '{attribute}': expected {expected}, got {found}")]
    TypeMismatch { attribute: String, expected: &'static str, found: &'static str },
    #[error("Invalid IRI: {0}")]
    InvalidIri(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, TriplebindError>;

// Helper conversions
impl From<rusqlite::Error> for TriplebindError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for TriplebindError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<oxrdf::IriParseError> for TriplebindError {
    fn from(e: oxrdf::IriParseError) -> Self { Self::InvalidIri(e.to_string()) }
}

/// Failure reported by a remote synchronization (the store's `update`).
///
/// These never surface from a property setter; they travel through
/// [`crate::commit::CommitOutcome`] and the mapper's commit listeners.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}{}", response_suffix(.response))]
pub struct SyncError {
    pub message: String,
    pub response: Option<String>,
}

impl SyncError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), response: None }
    }
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }
}

fn response_suffix(response: &Option<String>) -> String {
    response.as_ref().map(|r| format!(" ({r})")).unwrap_or_default()
}

impl From<TriplebindError> for SyncError {
    fn from(e: TriplebindError) -> Self { Self::new(e.to_string()) }
}
