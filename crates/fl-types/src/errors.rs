use thiserror::Error;

/// Main error type for Forgeline
#[derive(Error, Debug)]
pub enum FlError {
    #[error("Hyperparameter error: {0}")]
    Hyperparameter(#[from] HyperparameterError),

    #[error("Post-processing error: {0}")]
    PostProcess(#[from] PostProcessError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Hyperparameter store misuse
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HyperparameterError {
    #[error("Hyperparameter already registered: {name}")]
    DuplicateName { name: String },

    #[error("Unknown hyperparameter: {name}")]
    Unknown { name: String },

    #[error("Hyperparameter {name} has neither a user value nor a default")]
    Unresolved { name: String },

    #[error("Hyperparameter {name}: expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid value for hyperparameter {name}: {message}")]
    InvalidValue { name: String, message: String },
}

/// Post-processing lifecycle and contract errors
#[derive(Error, Debug)]
pub enum PostProcessError {
    #[error("Invalid post-processing configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Lifecycle violation: {operation} not allowed in state {state}")]
    Lifecycle { operation: String, state: String },

    #[error("Post-processing requires at least one candidate")]
    EmptySelection,

    #[error("Invalid timeout: {seconds} seconds (must be positive and finite)")]
    InvalidTimeout { seconds: f64 },

    #[error("Strategy {strategy} does not implement post-processing")]
    UnimplementedStrategy { strategy: String },

    #[error("No model could be produced within {timeout_seconds:.3} seconds")]
    TimeoutExceeded { timeout_seconds: f64 },

    #[error("Fitting candidate {candidate} failed: {message}")]
    FitFailed { candidate: String, message: String },
}

/// Tabular data validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Ragged feature table: row {row} has {actual} columns, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Row count mismatch: features have {features} rows, labels have {labels}")]
    RowMismatch { features: usize, labels: usize },

    #[error("Unexpected label kind: expected {expected}, got {actual}")]
    LabelKind {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Empty data: {message}")]
    Empty { message: String },
}

/// Result type alias for Forgeline operations
pub type FlResult<T> = Result<T, FlError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::FlError::Internal(format!($($arg)*))
    };
}
