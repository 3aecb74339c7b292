//! Renders a GraphQL operation as a stable resource name for tracing.
//!
//! Queries that differ only in argument literals, whitespace, comments, or
//! dead fragments should land on the same resource. To get there the chosen
//! operation is scrubbed (hard-coded String, Int, Float, List and Object
//! arguments collapse to empty placeholders; variables, enums and booleans
//! stay), its arguments, directives, variable definitions and selections are
//! sorted, only the fragments it actually reaches are kept, and the result
//! is reprinted from the syntax tree.

#![deny(missing_docs)]

mod scrub;


use std::collections::{BTreeMap, HashSet};

use anyhow::{anyhow, bail};
use graphql_parser::query::{Definition, Document, OperationDefinition};

/// Normalizes one operation of the document into its resource name.
///
/// A named lookup requires the document to contain an operation with that
/// name. An unnamed lookup requires the document to contain exactly one
/// operation.
pub fn normalize(source_text: &str, operation_name: Option<&str>) -> anyhow::Result<String> {
    let document = graphql_parser::parse_query::<&str>(source_text)?;

    let mut operations = Vec::new();
    let mut fragments = BTreeMap::new();
    for definition in document.definitions {
        match definition {
            Definition::Operation(operation) => operations.push(operation),
            Definition::Fragment(fragment) => {
                fragments.insert(fragment.name, fragment);
            }
        }
    }

    let mut operation = match operation_name {
        Some(name) => operations
            .into_iter()
            .find(|operation| name_of(operation) == Some(name))
            .ok_or_else(|| anyhow!("the document has no operation named {name:?}"))?,
        None => {
            let mut operations = operations.into_iter();
            match (operations.next(), operations.next()) {
                (Some(operation), None) => operation,
                (None, _) => bail!("the document has no operation"),
                _ => bail!("picking from multiple operations requires an operation name"),
            }
        }
    };

    let mut spreads = HashSet::new();
    scrub::operation(&mut operation, &mut spreads);

    // fragments can spread further fragments; keep pulling names out of the
    // scrubbed ones until the reachable set is exhausted
    let mut kept = Vec::new();
    let mut pending: Vec<String> = spreads.into_iter().collect();
    while let Some(name) = pending.pop() {
        let Some(mut fragment) = fragments.remove(name.as_str()) else {
            continue;
        };
        let mut nested = HashSet::new();
        scrub::fragment(&mut fragment, &mut nested);
        pending.extend(nested);
        kept.push(fragment);
    }
    kept.sort_by(|a, b| a.name.cmp(b.name));

    let mut definitions: Vec<Definition<'_, &str>> = kept.into_iter().map(Definition::Fragment).collect();
    definitions.push(Definition::Operation(operation));
    Ok(Document { definitions }.to_string())
}

fn name_of<'a>(operation: &OperationDefinition<'a, &'a str>) -> Option<&'a str> {
    match operation {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(query) => query.name,
        OperationDefinition::Mutation(mutation) => mutation.name,
        OperationDefinition::Subscription(subscription) => subscription.name,
    }
}
