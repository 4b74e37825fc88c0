//! Engine Error Types

use thiserror::Error;

/// Errors that can occur in the audio engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to start analysis thread: {0}")]
    AnalysisThread(String),

    #[error("Engine has been destroyed")]
    Destroyed,

    #[error("DSP error: {0}")]
    DspError(#[from] nyth_dsp::DspError),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::InvalidConfig("sample rate 100".into());
        assert!(err.to_string().contains("sample rate 100"));

        let err = EngineError::AnalysisThread("spawn failed".into());
        assert!(err.to_string().contains("spawn failed"));
    }

    #[test]
    fn test_error_from_dsp() {
        let dsp_err = nyth_dsp::DspError::InvalidBandIndex(10);
        let engine_err: EngineError = dsp_err.into();
        assert!(matches!(
            engine_err,
            EngineError::DspError(nyth_dsp::DspError::InvalidBandIndex(10))
        ));
        assert!(engine_err.to_string().contains("10"));
    }
}
