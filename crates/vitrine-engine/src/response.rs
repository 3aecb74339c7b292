use serde::Serialize;

use crate::{error::ServerError, optional_fields::OptionalFieldError};

/// The response envelope.
#[derive(Debug, Default, Serialize)]
pub struct Response {
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ServerError>,
    #[serde(skip_serializing_if = "ResponseExtensions::is_empty")]
    pub extensions: ResponseExtensions,
}

impl Response {
    pub fn from_errors(errors: Vec<ServerError>) -> Self {
        Self {
            data: serde_json::Value::Null,
            errors,
            extensions: ResponseExtensions::default(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseExtensions {
    /// Subtrees demoted by `@optionalField`, omitted when none failed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub optional_fields: Vec<OptionalFieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceSummary>,
}

impl ResponseExtensions {
    pub fn is_empty(&self) -> bool {
        self.optional_fields.is_empty() && self.trace.is_none()
    }
}

/// The request-level trace the response reports back.
#[derive(Debug, Clone, Serialize)]
pub struct TraceSummary {
    /// The normalized query text: argument literals scrubbed, so queries
    /// differing only in literals share a resource.
    pub resource: String,
    pub duration_ms: u64,
}
