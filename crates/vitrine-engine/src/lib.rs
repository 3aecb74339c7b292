//! A registry-driven GraphQL execution engine.
//!
//! The engine executes parsed operations against a [`registry::Registry`]
//! whose fields carry data-driven [`registry::resolvers::Resolver`]s. On top
//! of plain execution it provides:
//!
//! - [`composition`]: mounting root operations of a foreign registry as
//!   fields of the local schema, with type-name prefixing and version-scoped
//!   removal of deprecated fields;
//! - [`optional_fields`]: the `@optionalField` directive, demoting failures
//!   of marked subtrees from top-level errors to a response extension;
//! - per-field span decoration and an outer request span carrying the
//!   normalized query text.

pub mod composition;
pub mod optional_fields;
pub mod registry;

mod context;
mod error;
mod request;
mod resolver_utils;
mod response;
mod schema;

pub use async_graphql_value::{ConstValue, Name, Variables};
pub use context::{ContextField, ContextSelectionSet, Data, QueryEnv, QueryPath, QueryPathSegment, SchemaEnv};
pub use error::{Error, ErrorExtensionValues, PathSegment, Pos, ServerError, ServerResult};
pub use request::Request;
pub use response::{Response, ResponseExtensions, TraceSummary};
pub use schema::{Schema, SchemaBuilder};
