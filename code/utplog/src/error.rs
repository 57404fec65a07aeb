use thiserror::Error;

/// Run-level failures.  Problems with individual lines and tokens are never errors; they are
/// dropped by the parser and counted in ParseStats.

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// Nothing to plot: no sample carried the delay sample metric, or the selected socket produced
    /// no rows.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// The histogram bucket width is not a positive finite number.
    #[error("invalid quantization: {0}")]
    InvalidQuantization(String),
}
