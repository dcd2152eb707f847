use thiserror::Error;

use crate::buffer::MarkerId;

/// Errors raised by markers, tracked ranges and the display map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    #[error("marker {0} used after destroy")]
    Destroyed(MarkerId),

    #[error("marker {0} mutated from inside its own change callback")]
    Reentrant(MarkerId),

    #[error("the text buffer backing this range has been dropped")]
    BufferDropped,

    #[error("the display backing this marker has been dropped")]
    DisplayDropped,

    #[error("invalid fold over rows {start}..={end}")]
    InvalidFold { start: usize, end: usize },

    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, MarkerError>;
