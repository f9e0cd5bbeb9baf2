use std::fmt;

use thiserror::Error;

/// Error taxonomy for the UserOperation pipeline.
///
/// Every stage maps its failures onto one of these; nothing is swallowed or
/// retried internally. Retrying a stage without re-deriving nonce and gas
/// risks double-submission or stale-hash signatures, so a retry always
/// restarts the whole pipeline from a fresh draft.
#[derive(Debug, Error)]
pub enum Error {
    /// A network or contract call failed or reverted.
    #[error("rpc call failed: {0}")]
    Rpc(String),

    /// Malformed action or ABI mismatch while encoding call data.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// The bundler rejected the draft operation during gas estimation.
    #[error("gas estimation rejected: {0}")]
    Estimation(String),

    /// The signer was unavailable or refused to sign.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The bundler rejected the signed operation or returned an explicit
    /// error payload.
    #[error("submission rejected: {0}")]
    Submission(String),
}

/// Pipeline stage that produced an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Draft,
    Sponsorship,
    Estimate,
    Sign,
    Submit,
    Receipt,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Sponsorship => "sponsorship",
            Self::Estimate => "estimate",
            Self::Sign => "sign",
            Self::Submit => "submit",
            Self::Receipt => "receipt",
        };
        f.write_str(s)
    }
}

/// A pipeline failure tagged with the stage it originated from.
#[derive(Debug, Error)]
#[error("user operation pipeline failed during {stage}: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl PipelineError {
    pub fn new(stage: Stage, source: Error) -> Self {
        Self { stage, source }
    }
}

/// `map_err` helper for tagging stage failures.
pub fn at_stage(stage: Stage) -> impl Fn(Error) -> PipelineError {
    move |source| PipelineError { stage, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_names_stage_and_cause() {
        let err = at_stage(Stage::Submit)(Error::Submission("insufficient funds".into()));
        assert_eq!(err.stage, Stage::Submit);
        let msg = err.to_string();
        assert!(msg.contains("submit"));
        assert!(msg.contains("insufficient funds"));
    }
}
