//! Error taxonomy shared by the graph assembly layer.
//!
//! Operations return `anyhow::Result`; failures callers are expected to react to are raised as
//! a [`ModelError`] inside the `anyhow::Error` and can be recovered with `downcast_ref`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The requested graph or resource does not exist.
    #[error("Graph {0} was not found")]
    NotFound(String),
    /// The model or resource carries a VALID status and may not be mutated.
    #[error("{0} is locked by its VALID status")]
    Locked(String),
    /// The requested identifier already names an existing graph.
    #[error("IRI {0} is already in use")]
    UsedIri(String),
    /// The triple-store or an external resolver could not be reached.
    #[error("{service} is unavailable: {reason}")]
    UpstreamUnavailable { service: String, reason: String },
    /// Rejected input such as an invalid IRI or language tag.
    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

impl ModelError {
    pub fn upstream(service: impl Into<String>, reason: impl ToString) -> Self {
        ModelError::UpstreamUnavailable {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        ModelError::MalformedInput(msg.into())
    }

    /// HTTP-equivalent status code for the endpoint layer.
    pub fn status_code(&self) -> u16 {
        match self {
            ModelError::NotFound(_) => 404,
            ModelError::Locked(_) => 423,
            ModelError::UsedIri(_) => 409,
            ModelError::UpstreamUnavailable { .. } => 503,
            ModelError::MalformedInput(_) => 400,
        }
    }
}

/// Returns the [`ModelError`] carried by an `anyhow::Error`, if any.
pub fn model_error(err: &anyhow::Error) -> Option<&ModelError> {
    err.downcast_ref::<ModelError>()
}
