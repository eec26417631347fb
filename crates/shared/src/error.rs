use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::StreamKind;

/// A remote fetch for one stream rejected or failed in transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{stream} fetch failed: {message}")]
pub struct FetchFailure {
    pub stream: StreamKind,
    pub message: String,
}

impl FetchFailure {
    pub fn new(stream: StreamKind, message: impl Into<String>) -> Self {
        Self {
            stream,
            message: message.into(),
        }
    }
}
