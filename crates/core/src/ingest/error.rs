use crate::domain::price::SourceId;
use thiserror::Error;

/// Failure of a single source attempt. Cloneable so a coalesced fetch
/// cycle can hand the same failure to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("transport: {0}")]
    Transport(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("source is not configured")]
    NotConfigured,
}

impl SourceError {
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(timeout_secs)
        } else {
            SourceError::Transport(err.to_string())
        }
    }
}

/// Every source in the cycle failed. Carries each sub-error in attempt
/// order for diagnostics; a succeeding source never masks earlier errors
/// into its snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct AggregateFailure {
    pub attempts: Vec<(SourceId, SourceError)>,
}

impl std::fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "all price sources failed")?;
        for (source, err) in &self.attempts {
            write!(f, "; {source}: {err}")?;
        }
        Ok(())
    }
}
