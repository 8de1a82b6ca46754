use thiserror::Error;

use crate::error::ProcessError;
use crate::provider::ProviderError;

/// Why a single attempt failed. Provider errors may be retryable; local
/// processing errors never are.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Process(#[from] ProcessError),
}

impl AttemptError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Provider(e) => e.is_retryable(),
            AttemptError::Process(_) => false,
        }
    }
}
