//! Engine creation failures.

/// Shown when a failure carries no readable message.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Why the external engine could not be created.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// The engine gave up without saying why.
    #[error("engine creation failed without a reason")]
    Unexplained,
}

impl EngineError {
    pub fn msg<M>(message: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        EngineError::Failed(anyhow::Error::msg(message))
    }

    /// Human readable cause, including the context chain, if there is one.
    pub fn message(&self) -> Option<String> {
        match self {
            EngineError::Failed(e) => {
                let message = format!("{e:#}");
                (!message.trim().is_empty()).then_some(message)
            }
            EngineError::Unexplained => None,
        }
    }

    /// The text stored in the `Error` state.
    pub fn user_message(&self) -> String {
        self.message().unwrap_or_else(|| UNKNOWN_ERROR.to_owned())
    }
}
