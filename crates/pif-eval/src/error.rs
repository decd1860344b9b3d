use pif_ast::span::Span;
use pif_types::Type;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

/// Everything that can abort an evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalErrorKind {
    #[error("no such name `{name}` in current context")]
    NameNotFound { name: String },

    #[error("no such type `{ty}` in current context")]
    TypeNotFound { ty: Type },

    #[error("ambiguous type `{ty}`: {reason}")]
    AmbiguousType { ty: Type, reason: String },

    #[error(
        "cannot fill parameter `{param}` automatically: `{ty}` appears more than once in the signature"
    )]
    AmbiguousAutoFill { param: String, ty: Type },

    #[error("{0}")]
    ShadowConflict(String),

    #[error("multiple values left over: {values}")]
    AmbiguousResult { values: String },

    #[error("{construct} condition must have a result")]
    MissingConditionResult { construct: &'static str },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("{0} produced no value")]
    MissingValue(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("maximum call depth exceeded (limit: {limit} calls)")]
    CallDepthExceeded { limit: usize },

    #[error("host function `{name}`: {message}")]
    Host { name: String, message: String },
}

/// An [`EvalErrorKind`] plus the position of the node that raised it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub span: Option<Span>,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind) -> Self {
        Self { kind, span: None }
    }

    /// Attach `span` unless a more precise one is already present.
    pub fn at(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::TypeMismatch(message.into()))
    }

    pub fn shadow(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::ShadowConflict(message.into()))
    }
}

impl From<EvalErrorKind> for EvalError {
    fn from(kind: EvalErrorKind) -> Self {
        Self::new(kind)
    }
}

pub(crate) trait ResultExt<T> {
    fn at(self, span: Span) -> EvalResult<T>;
}

impl<T> ResultExt<T> for EvalResult<T> {
    fn at(self, span: Span) -> EvalResult<T> {
        self.map_err(|e| e.at(span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_span_wins() {
        let inner = Span { start: 4, end: 9 };
        let outer = Span { start: 0, end: 20 };
        let err = EvalError::new(EvalErrorKind::DivisionByZero).at(inner).at(outer);
        assert_eq!(err.span, Some(inner));
    }

    #[test]
    fn display_uses_kind_message() {
        let err = EvalError::new(EvalErrorKind::TypeNotFound { ty: Type::text() });
        assert_eq!(err.to_string(), "no such type `string` in current context");
    }
}
