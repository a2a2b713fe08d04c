//! Error taxonomy shared by declaration, sanitization, evaluation and I/O.

/// Every failure the crate can report. None of these are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum BinDataError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown type: {0}")]
    UnknownType(String),
    #[error("Duplicate field name: {0}")]
    DuplicateFieldName(String),
    #[error("Reserved field name: {0}")]
    ReservedFieldName(String),
    #[error("{type_name}: missing mandatory parameter '{param}'")]
    MandatoryParameterMissing { type_name: String, param: String },
    #[error("{type_name}: parameters '{first}' and '{second}' are mutually exclusive")]
    MutuallyExclusiveParameters {
        type_name: String,
        first: String,
        second: String,
    },
    #[error("{type_name}: parameter '{param}' is bound to nil")]
    NilParameterValue { type_name: String, param: String },
    #[error("No such name '{name}' in {context}")]
    NoSuchName { name: String, context: String },
    #[error("{debug_name}: invalid selection {selection} ({choices} choices)")]
    InvalidSelection {
        debug_name: String,
        selection: String,
        choices: usize,
    },
    #[error("{debug_name}: offset mismatch (expected {expected}, actual {actual})")]
    OffsetMismatch {
        debug_name: String,
        expected: String,
        actual: u64,
    },
    #[error("{debug_name}: operation '{operation}' not supported")]
    NoSuchOperation {
        debug_name: String,
        operation: &'static str,
    },
    #[error("Argument: {0}")]
    Argument(String),
    #[error("Expression: {0}")]
    Expression(String),
    #[error("{debug_name}: assertion failed for value {value}")]
    AssertionFailed { debug_name: String, value: String },
    #[error("Stale object handle #{0}")]
    StaleObject(usize),
}

pub type Result<T> = std::result::Result<T, BinDataError>;
