use std::collections::HashMap;
use thiserror::Error;

use crate::db::VisitStatus;

/// Errors returned by visit lifecycle operations
#[derive(Debug, Error)]
pub enum VisitError {
    #[error("Invalid visit data")]
    Validation(HashMap<String, Vec<String>>),

    #[error("User is not authenticated")]
    Unauthenticated,

    #[error("Visit {0} not found")]
    NotFound(i64),

    #[error("{reason}")]
    InvalidState {
        id: i64,
        status: VisitStatus,
        reason: &'static str,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl VisitError {
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::Validation(errors)
    }
}

pub(crate) const ALREADY_FINISHED: &str = "Visit already checked out or cancelled";
pub(crate) const ONLY_ACTIVE_CANCEL: &str = "Only active visits may be cancelled";
