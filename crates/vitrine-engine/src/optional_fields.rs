//! The `@optionalField` directive.
//!
//! A client marks a field whose failure it can tolerate. When any failure
//! happens at or under the marked field, the marked field resolves to null
//! (even when its type is non-null) and the failure is reported in the
//! `extensions.optionalFields` side channel instead of the top-level error
//! list. Data the client considers essential still fails the query the
//! normal way.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;

use async_graphql_parser::types::{FragmentDefinition, OperationDefinition, Selection, SelectionSet};
use async_graphql_parser::Positioned;
use async_graphql_value::Name;

use crate::error::{PathSegment, ServerError};

pub const OPTIONAL_FIELD_DIRECTIVE: &str = "optionalField";

/// The response-key path of one `@optionalField` marker. Markers are
/// independent: a marker nested under another still carries its full path
/// from the operation root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalFieldMarker {
    pub path: Vec<String>,
}

impl OptionalFieldMarker {
    /// Whether an error path falls at or under this marker. Error paths
    /// carry list indices; markers do not, so indices are skipped when
    /// matching.
    pub fn owns(&self, error_path: &[PathSegment]) -> bool {
        let fields: Vec<&str> = error_path
            .iter()
            .filter_map(|segment| match segment {
                PathSegment::Field(name) => Some(name.as_str()),
                PathSegment::Index(_) => None,
            })
            .collect();
        fields.len() >= self.path.len() && self.path.iter().zip(&fields).all(|(a, b)| a == b)
    }
}

/// One demoted subtree in `extensions.optionalFields`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionalFieldError {
    pub path: Vec<String>,
    pub http_status_code: Option<u16>,
}

/// Collects the markers of an operation before execution starts. A pure
/// walk: aliases are honored (the marker records response keys), fragment
/// spreads and inline fragments are traversed in place.
pub fn collect_markers(
    operation: &OperationDefinition,
    fragments: &HashMap<Name, Positioned<FragmentDefinition>>,
) -> Vec<OptionalFieldMarker> {
    let mut markers = Vec::new();
    let mut prefix = Vec::new();
    walk_selection_set(&operation.selection_set.node, fragments, &mut prefix, &mut markers);
    markers
}

fn walk_selection_set(
    selection_set: &SelectionSet,
    fragments: &HashMap<Name, Positioned<FragmentDefinition>>,
    prefix: &mut Vec<String>,
    markers: &mut Vec<OptionalFieldMarker>,
) {
    for selection in &selection_set.items {
        match &selection.node {
            Selection::Field(field) => {
                let response_key = field
                    .node
                    .alias
                    .as_ref()
                    .map(|alias| alias.node.to_string())
                    .unwrap_or_else(|| field.node.name.node.to_string());
                prefix.push(response_key);
                let marked = field
                    .node
                    .directives
                    .iter()
                    .any(|directive| directive.node.name.node.as_str() == OPTIONAL_FIELD_DIRECTIVE);
                if marked {
                    let marker = OptionalFieldMarker { path: prefix.clone() };
                    if !markers.contains(&marker) {
                        markers.push(marker);
                    }
                }
                walk_selection_set(&field.node.selection_set.node, fragments, prefix, markers);
                prefix.pop();
            }
            Selection::FragmentSpread(spread) => {
                if let Some(fragment) = fragments.get(&spread.node.fragment_name.node) {
                    walk_selection_set(&fragment.node.selection_set.node, fragments, prefix, markers);
                }
            }
            Selection::InlineFragment(inline) => {
                walk_selection_set(&inline.node.selection_set.node, fragments, prefix, markers);
            }
        }
    }
}

/// Splits recorded errors into the ones that stay in the top-level list and
/// the demoted per-marker entries. When several markers cover an error path,
/// the longest prefix owns it; several errors under one marker coalesce into
/// a single entry whose status code is the first one observed.
pub fn correlate_errors(
    markers: &[OptionalFieldMarker],
    errors: Vec<ServerError>,
) -> (Vec<ServerError>, Vec<OptionalFieldError>) {
    let mut retained = Vec::new();
    let mut demoted: IndexMap<Vec<String>, Option<u16>> = IndexMap::new();

    for error in errors {
        let owner = markers
            .iter()
            .filter(|marker| marker.owns(&error.path))
            .max_by_key(|marker| marker.path.len());
        match owner {
            Some(marker) => {
                let status = error.extensions.as_ref().and_then(|ext| ext.http_status_code());
                let entry = demoted.entry(marker.path.clone()).or_insert(None);
                if entry.is_none() {
                    *entry = status;
                }
            }
            None => retained.push(error),
        }
    }

    let demoted = demoted
        .into_iter()
        .map(|(path, http_status_code)| OptionalFieldError { path, http_status_code })
        .collect();
    (retained, demoted)
}
