//! Error types shared across the store, resolver, scheduler and dispatcher.

/// Error type for birthday store and command operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotError {
    /// Malformed user input (bad date pattern, missing arguments)
    Validation(String),
    /// A record with the same identity key already exists
    Duplicate,
    /// No record matched the given name in the given destination
    NotFound,
    /// No live destination could be found for a record
    Unresolved(String),
    /// Malformed persisted payload or a failed write
    Storage(String),
}

impl std::fmt::Display for BotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotError::Validation(msg) => write!(f, "Validation error: {}", msg),
            BotError::Duplicate => write!(f, "Record already exists"),
            BotError::NotFound => write!(f, "Record not found"),
            BotError::Unresolved(name) => {
                write!(f, "Could not resolve destination for '{}'", name)
            }
            BotError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for BotError {}
