use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Additional context about the error (e.g., expected value, task id)
    pub details: Option<String>,
    /// Source of the error (e.g., "connection_pool", "possibility_stream")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            details: None,
            source: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Unified error type for the orchestration core.
///
/// Failures are contained at the smallest meaningful scope (one breaker, one
/// pool task, one possibility branch) and never escalate to sibling scopes,
/// so most variants identify the scope they belong to.
#[derive(Debug, Error)]
pub enum Error {
    /// The named circuit breaker is open; the wrapped operation was not invoked.
    #[error("circuit breaker open for {name}{}", retry_hint(.retry_in_ms))]
    BreakerOpen {
        name: String,
        /// Remaining recovery time in ms, if known.
        retry_in_ms: Option<u64>,
    },

    /// A queued task was removed from the pool before it started.
    #[error("task {task_id} aborted before execution")]
    TaskAborted { task_id: String },

    /// A provider call failed (streaming or non-streaming).
    #[error("provider {provider} error: {message}")]
    Provider {
        provider: String,
        message: String,
        retryable: bool,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper functions to format error display suffixes
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn retry_hint(retry_in_ms: &Option<u64>) -> String {
    match retry_in_ms {
        Some(ms) => format!(" (retry in {}ms)", ms),
        None => String::new(),
    }
}

impl Error {
    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new runtime error without additional context
    pub fn runtime(msg: impl Into<String>) -> Self {
        Error::Runtime {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// True if this is the distinguished breaker fast-fail error.
    pub fn is_breaker_open(&self) -> bool {
        matches!(self, Error::BreakerOpen { .. })
    }

    /// True if this is a queued-task abort.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::TaskAborted { .. })
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_open_display() {
        let err = Error::BreakerOpen {
            name: "ai-provider-openai".to_string(),
            retry_in_ms: Some(1500),
        };
        assert_eq!(
            err.to_string(),
            "circuit breaker open for ai-provider-openai (retry in 1500ms)"
        );
        assert!(err.is_breaker_open());
        assert!(!err.is_aborted());
    }

    #[test]
    fn test_context_formatting() {
        let err = Error::runtime_with_context(
            "queue stalled",
            ErrorContext::new()
                .with_details("active=6")
                .with_source("connection_pool"),
        );
        let msg = err.to_string();
        assert!(msg.contains("queue stalled"));
        assert!(msg.contains("details: active=6"));
        assert!(msg.contains("source: connection_pool"));
    }

    #[test]
    fn test_aborted_predicate() {
        let err = Error::TaskAborted {
            task_id: "perm-1".to_string(),
        };
        assert!(err.is_aborted());
        assert_eq!(err.to_string(), "task perm-1 aborted before execution");
    }
}
