use thiserror::Error;

use super::UserId;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Mismatched batch lengths: ids={ids}, vectors={vectors}, payloads={payloads}")]
    LengthMismatch {
        ids: usize,
        vectors: usize,
        payloads: usize,
    },

    #[error("Embedding count mismatch: requested {requested}, returned {returned}")]
    CountMismatch { requested: usize, returned: usize },

    #[error("No activity to aggregate for user {user_id}")]
    NoActivity { user_id: UserId },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Queue closed")]
    QueueClosed,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<DomainError>,
    },
}

impl DomainError {
    pub fn not_initialized(msg: impl Into<String>) -> Self {
        Self::NotInitialized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    /// Wraps the error with the unit (listing batch, user, tier) it was raised for.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with every `Context` layer removed.
    pub fn root(&self) -> &DomainError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_no_activity(&self) -> bool {
        matches!(self.root(), Self::NoActivity { .. })
    }

    /// Whether trying the same unit of work again could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.root(),
            Self::NoActivity { .. }
                | Self::Validation(_)
                | Self::LengthMismatch { .. }
                | Self::NotInitialized(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_root_classification() {
        let err = DomainError::NoActivity { user_id: 7 }.context("user 7");
        assert!(err.is_no_activity());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "user 7: No activity to aggregate for user 7");
    }

    #[test]
    fn test_upstream_failures_are_retryable() {
        let err = DomainError::external("qdrant unavailable").context("listing batch [1, 2]");
        assert!(err.is_retryable());
        assert!(matches!(err.root(), DomainError::ExternalService(_)));
    }
}
