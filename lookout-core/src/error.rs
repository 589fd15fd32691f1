//! Validation errors for rules, artifacts and startup configuration

use thiserror::Error;

/// A rule, artifact or registry failed validation.
///
/// Always fatal for the operation that raised it; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("artifact data is empty")]
    EmptyArtifact,

    #[error("field `{0}` is required")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("enrichment `{kind}` is claimed by both `{first}` and `{second}`")]
    DuplicateCapability {
        kind: String,
        first: String,
        second: String,
    },
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
