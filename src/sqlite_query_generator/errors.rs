use thiserror::Error;

/// Translation failures. The translator stops at the first error; no partial
/// SQL is returned for a failing query.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranslatorError {
    #[error("Syntax error: {0}")]
    SyntaxError(String),
    #[error("Variable '{0}' not defined (bind it in a MATCH, WITH, or UNWIND first)")]
    UnknownVariable(String),
    #[error("Variable '{0}' already bound (a name cannot be redeclared as a different kind)")]
    VariableAlreadyBound(String),
    #[error("Parameter '{0}' was not supplied")]
    UnknownParameter(String),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("Malformed expression: {0}")]
    MalformedExpression(String),
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),
}

impl TranslatorError {
    pub fn syntax(message: impl Into<String>) -> Self {
        TranslatorError::SyntaxError(message.into())
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        TranslatorError::TypeMismatch(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        TranslatorError::InvalidArgument(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        TranslatorError::UnsupportedFeature(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        TranslatorError::MalformedExpression(message.into())
    }
}
