use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A location in the source query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl From<async_graphql_parser::Pos> for Pos {
    fn from(pos: async_graphql_parser::Pos) -> Self {
        Self {
            line: pos.line,
            column: pos.column,
        }
    }
}

/// A segment of the response path an error is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// The `extensions` map carried by an error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorExtensionValues(BTreeMap<String, serde_json::Value>);

impl ErrorExtensionValues {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// The upstream HTTP status a fetch failure was tagged with, if any.
    pub fn http_status_code(&self) -> Option<u16> {
        self.get("httpStatusCode")
            .and_then(serde_json::Value::as_u64)
            .and_then(|status| u16::try_from(status).ok())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An error in the GraphQL response, positioned and pathed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub locations: Vec<Pos>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub path: Vec<PathSegment>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extensions: Option<ErrorExtensionValues>,
}

impl ServerError {
    pub fn new(message: impl Into<String>, pos: Option<Pos>) -> Self {
        Self {
            message: message.into(),
            locations: pos.into_iter().collect(),
            path: Vec::new(),
            extensions: None,
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

/// A resolver failure. It becomes a [`ServerError`] once the executor knows
/// the field position and response path it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub message: String,
    pub extensions: Option<ErrorExtensionValues>,
}

impl Error {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: None,
        }
    }

    /// An error tagged with the upstream HTTP status that caused it.
    pub fn new_with_status(message: impl Into<String>, status: u16) -> Self {
        let mut extensions = ErrorExtensionValues::default();
        extensions.set("httpStatusCode", status);
        Self {
            message: message.into(),
            extensions: Some(extensions),
        }
    }

    pub fn into_server_error(self, pos: Pos) -> ServerError {
        ServerError {
            message: self.message,
            locations: vec![pos],
            path: Vec::new(),
            extensions: self.extensions,
        }
    }
}
