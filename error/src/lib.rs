//! Provides the error type and associated convenience methods for the hiertensor engine.
//!
//! Every failure in the engine is a precondition violation which is detected before any
//! output is made visible, so none of these errors is transient or retryable.

use std::fmt;

/// A result of type `T`, or an [`HTError`]
pub type HTResult<T> = Result<T, HTError>;

/// The category of an [`HTError`].
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum ErrorType {
    BadRequest,
    FormatDimensionMismatch,
    Internal,
    StorageNotReady,
    UnboundIndexVariable,
    Unsupported,
}

impl fmt::Debug for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::BadRequest => "bad request",
            Self::FormatDimensionMismatch => "format dimension mismatch",
            Self::Internal => "internal error",
            Self::StorageNotReady => "storage not ready",
            Self::UnboundIndexVariable => "unbound index variable",
            Self::Unsupported => "unsupported",
        })
    }
}

/// A general error description.
pub struct HTError {
    code: ErrorType,
    message: String,
    stack: Vec<String>,
}

impl HTError {
    /// Returns a new error with the given code and message.
    pub fn new<I: fmt::Display>(code: ErrorType, message: I) -> Self {
        Self {
            code,
            message: message.to_string(),
            stack: vec![],
        }
    }

    /// Error indicating that the caller supplied malformed input, e.g. a coordinate
    /// outside the bounds of a tensor.
    pub fn bad_request<M: fmt::Display, I: fmt::Display>(message: M, cause: I) -> Self {
        Self::new(ErrorType::BadRequest, format!("{}: {}", message, cause))
    }

    /// Error indicating that a format has a different number of levels than the tensor
    /// it describes has dimensions.
    pub fn format_dimension_mismatch<F: fmt::Display>(format: F, ndim: usize) -> Self {
        Self::new(
            ErrorType::FormatDimensionMismatch,
            format!("format {} does not describe a tensor of order {}", format, ndim),
        )
    }

    /// A truly unexpected error, for which the caller cannot define any specific handling.
    pub fn internal<I: fmt::Display>(info: I) -> Self {
        log::error!("{}", info);
        Self::new(ErrorType::Internal, info)
    }

    /// Error indicating that a storage was accessed before reaching the required state.
    pub fn storage_not_ready<A: fmt::Display, S: fmt::Display>(access: A, state: S) -> Self {
        Self::new(
            ErrorType::StorageNotReady,
            format!("cannot {} a storage which is {}", access, state),
        )
    }

    /// Error indicating that an index variable has no consistent dimension binding.
    pub fn unbound_index_variable<V: fmt::Display, I: fmt::Display>(var: V, info: I) -> Self {
        Self::new(
            ErrorType::UnboundIndexVariable,
            format!("index variable {}: {}", var, info),
        )
    }

    /// Error indicating that a well-formed request uses a configuration the engine
    /// does not support.
    pub fn unsupported<I: fmt::Display>(info: I) -> Self {
        Self::new(ErrorType::Unsupported, info)
    }

    pub fn code(&self) -> ErrorType {
        self.code
    }

    pub fn message(&'_ self) -> &'_ str {
        &self.message
    }

    /// The context added to this error by [`HTError::consume`], innermost first.
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    pub fn consume<I: fmt::Display>(mut self, info: I) -> Self {
        self.stack.push(info.to_string());
        self
    }
}

impl std::error::Error for HTError {}

impl fmt::Debug for HTError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for HTError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;

        for info in &self.stack {
            write!(f, "\n  while {}", info)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = HTError::format_dimension_mismatch("(sparse)", 2);
        assert_eq!(err.code(), ErrorType::FormatDimensionMismatch);
        assert_eq!(
            err.to_string(),
            "format dimension mismatch: format (sparse) does not describe a tensor of order 2"
        );
    }

    #[test]
    fn test_consume() {
        let err = HTError::storage_not_ready("read the values of", "assembled")
            .consume("computing a(i)");

        assert_eq!(err.code(), ErrorType::StorageNotReady);
        assert_eq!(err.message(), "cannot read the values of a storage which is assembled");
        assert_eq!(err.stack(), &["computing a(i)".to_string()]);
        assert!(err.to_string().ends_with("\n  while computing a(i)"));
    }
}
