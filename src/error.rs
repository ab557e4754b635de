use thiserror::Error;

/// Failure to simulate one player. Recoverable: the pipeline logs it and
/// skips the player.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("no historical data for {0}")]
    DataUnavailable(String),

    #[error("malformed historical data for {subject}: {reason}")]
    MalformedData { subject: String, reason: String },

    #[error("invalid simulation parameters: {0}")]
    InvalidParameters(String),

    #[error("historical source error: {0}")]
    Source(String),
}

/// Invalid numeric input to the betting math.
#[derive(Debug, Error, PartialEq)]
pub enum MathError {
    #[error("American price of 0 is undefined")]
    ZeroPrice,

    #[error("American price {0} is inside (-100, 100)")]
    PriceOutOfRange(i32),

    #[error("probability {0} is outside [0, 1]")]
    ProbabilityOutOfRange(f64),

    #[error("non-finite input: {0}")]
    NonFinite(f64),
}

/// Cache or export I/O failure. Fatal for the run.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error at {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}
