#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// Empty symbol set, zero weight or multiplier, missing or duplicated entries.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Negative bet, zero spin count, zero reel count.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SlotError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SlotError::InvalidConfiguration(msg.into())
    }

    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        SlotError::InvalidArgument(msg.into())
    }
}

pub type SlotResult<T> = Result<T, SlotError>;
