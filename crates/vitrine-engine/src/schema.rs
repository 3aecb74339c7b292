use std::{
    any::Any,
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Instant,
};

use async_graphql_parser::types::{Directive, DocumentOperations, OperationType, Selection, SelectionSet};
use async_graphql_parser::Positioned;
use async_graphql_value::{ConstValue, Value, Variables};
use tracing::{info_span, Instrument};

use crate::{
    context::{ContextSelectionSet, Data, QueryEnv, QueryEnvInner, QueryPath, SchemaEnv, SchemaEnvInner},
    error::ServerError,
    optional_fields,
    registry::{resolvers::Resolver, Registry, TypeReference},
    request::Request,
    resolver_utils::{resolve_root_container, resolve_root_container_serial},
    response::{Response, ResponseExtensions, TraceSummary},
};

pub struct SchemaBuilder {
    registry: Registry,
    data: Data,
}

impl SchemaBuilder {
    /// Injects a schema-lifetime value, available to every request through
    /// `ctx.data::<D>()` unless shadowed by request data.
    #[must_use]
    pub fn data<D: Any + Send + Sync>(mut self, data: D) -> Self {
        self.data.insert(data);
        self
    }

    pub fn finish(mut self) -> Schema {
        decorate_resolvers(&mut self.registry);
        Schema {
            env: SchemaEnv::new(SchemaEnvInner {
                registry: self.registry,
                data: self.data,
            }),
        }
    }
}

/// An executable schema. Cheap to clone; shared by every request.
#[derive(Clone)]
pub struct Schema {
    env: SchemaEnv,
}

impl Schema {
    pub fn build(registry: Registry) -> SchemaBuilder {
        SchemaBuilder {
            registry,
            data: Data::default(),
        }
    }

    pub fn new(registry: Registry) -> Self {
        Self::build(registry).finish()
    }

    pub fn registry(&self) -> &Registry {
        &self.env.registry
    }

    /// Executes a request to completion.
    ///
    /// The whole execution runs inside a span tagged with the normalized
    /// query text, so operations differing only in argument literals share a
    /// resource name. The response carries that resource and the elapsed
    /// time in its `trace` extension.
    pub async fn execute(&self, request: impl Into<Request>) -> Response {
        let request = request.into();
        let started = Instant::now();
        let resource = operation_normalizer::normalize(&request.query, request.operation_name.as_deref())
            .unwrap_or_else(|_| request.query.clone());
        let span = info_span!("graphql_request", graphql.document = %resource);

        async {
            let mut response = match self.execute_once(request).await {
                Ok(response) => response,
                Err(errors) => Response::from_errors(errors),
            };
            response.extensions.trace = Some(TraceSummary {
                resource,
                duration_ms: started.elapsed().as_millis() as u64,
            });
            response
        }
        .instrument(span)
        .await
    }

    async fn execute_once(&self, request: Request) -> Result<Response, Vec<ServerError>> {
        let document =
            async_graphql_parser::parse_query(&request.query).map_err(|error| vec![ServerError::new(error.to_string(), None)])?;

        let mut operation = match (document.operations, request.operation_name.as_deref()) {
            (DocumentOperations::Single(operation), _) => operation,
            (DocumentOperations::Multiple(mut operations), Some(name)) => operations
                .remove(name)
                .ok_or_else(|| vec![ServerError::new(format!(r#"Unknown operation named "{name}"."#), None)])?,
            (DocumentOperations::Multiple(operations), None) => {
                let mut operations = operations.into_iter();
                match (operations.next(), operations.next()) {
                    (Some((_, operation)), None) => operation,
                    _ => return Err(vec![ServerError::new("Operation name required in request.", None)]),
                }
            }
        };

        let mut fragments = document.fragments;
        remove_skipped_selection(&mut operation.node.selection_set.node, &request.variables);
        for fragment in fragments.values_mut() {
            remove_skipped_selection(&mut fragment.node.selection_set.node, &request.variables);
        }

        let optional_markers = optional_fields::collect_markers(&operation.node, &fragments);
        let operation_type = operation.node.ty;

        let env = QueryEnv::new(QueryEnvInner {
            operation,
            operation_name: request.operation_name,
            fragments,
            variables: request.variables,
            ctx_data: Arc::new(request.data),
            errors: Mutex::new(Vec::new()),
            optional_markers,
        });

        let registry = &self.env.registry;
        let root_name = match operation_type {
            OperationType::Query => registry.query_type.as_str(),
            OperationType::Mutation => registry
                .mutation_type
                .as_deref()
                .ok_or_else(|| vec![ServerError::new("Mutations are not supported.", None)])?,
            OperationType::Subscription => {
                return Err(vec![ServerError::new("Subscriptions are not supported.", None)]);
            }
        };
        let root = registry
            .types
            .get(root_name)
            .ok_or_else(|| vec![ServerError::new(format!(r#"Unknown root type "{root_name}"."#), None)])?;

        let ctx = ContextSelectionSet {
            ty: root,
            item: &env.operation.node.selection_set,
            schema_env: &self.env,
            query_env: &env,
            path: QueryPath::default(),
        };
        let result = match operation_type {
            OperationType::Mutation => resolve_root_container_serial(&ctx).await,
            _ => resolve_root_container(&ctx).await,
        };

        let mut errors = std::mem::take(&mut *env.errors.lock().expect("error sink poisoned"));
        let data = match result {
            Ok(data) => data,
            Err(error) => {
                errors.push(error);
                serde_json::Value::Null
            }
        };
        let (errors, optional_fields) = optional_fields::correlate_errors(&env.optional_markers, errors);

        Ok(Response {
            data,
            errors,
            extensions: ResponseExtensions {
                optional_fields,
                trace: None,
            },
        })
    }
}

/// Wraps every resolver producing a composite value in [`Resolver::Traced`],
/// so each such field invocation runs inside its own span. Fields already
/// wrapped are left alone; running the pass twice decorates once.
fn decorate_resolvers(registry: &mut Registry) {
    let composite: HashSet<String> = registry
        .types
        .values()
        .filter(|ty| ty.is_composite())
        .map(|ty| ty.name().to_string())
        .collect();

    for ty in registry.types.values_mut() {
        let Some(fields) = ty.fields_mut() else { continue };
        for field in fields.values_mut() {
            if field.resolver.is_parent() || field.resolver.is_traced() {
                continue;
            }
            if !composite.contains(field.ty.named_type()) {
                continue;
            }
            let resolver = std::mem::replace(&mut field.resolver, Resolver::Parent);
            field.resolver = Resolver::Traced(Box::new(resolver));
        }
    }
}

/// Prunes selections skipped by `@skip`/`@include` before execution starts,
/// so the rest of the pipeline never sees them.
fn remove_skipped_selection(selection_set: &mut SelectionSet, variables: &Variables) {
    selection_set
        .items
        .retain(|selection| !is_skipped(selection_directives(&selection.node), variables));
    for selection in &mut selection_set.items {
        match &mut selection.node {
            Selection::Field(field) => remove_skipped_selection(&mut field.node.selection_set.node, variables),
            Selection::FragmentSpread(_) => {}
            Selection::InlineFragment(inline) => {
                remove_skipped_selection(&mut inline.node.selection_set.node, variables);
            }
        }
    }
}

fn selection_directives(selection: &Selection) -> &[Positioned<Directive>] {
    match selection {
        Selection::Field(field) => &field.node.directives,
        Selection::FragmentSpread(spread) => &spread.node.directives,
        Selection::InlineFragment(inline) => &inline.node.directives,
    }
}

fn is_skipped(directives: &[Positioned<Directive>], variables: &Variables) -> bool {
    for directive in directives {
        let skip_when = match directive.node.name.node.as_str() {
            "skip" => true,
            "include" => false,
            _ => continue,
        };
        let condition = directive
            .node
            .arguments
            .iter()
            .find(|(name, _)| name.node.as_str() == "if")
            .and_then(|(_, value)| match &value.node {
                Value::Boolean(value) => Some(*value),
                Value::Variable(name) => match variables.get(name) {
                    Some(ConstValue::Boolean(value)) => Some(*value),
                    _ => None,
                },
                _ => None,
            });
        if condition == Some(skip_when) {
            return true;
        }
    }
    false
}
