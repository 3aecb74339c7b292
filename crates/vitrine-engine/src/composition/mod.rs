//! Remote schema composition.
//!
//! A foreign registry (typically converted from an introspection result) is
//! merged into the local one with a source-specific type-name prefix, and
//! selected foreign root operations are mounted as fields of local types via
//! [`RemoteBinding`]s. Every contract violation is a build-time
//! [`CompositionError`]; a schema that composes is safe to serve.

use indexmap::IndexMap;

use crate::registry::{
    resolvers::{ArgumentMapper, BoundOperation, Resolver, ResolverArguments},
    MetaField, MetaInputValue, MetaType, Registry, TypeReference, BUILTIN_SCALARS,
};

// Hand-written Display/Error impls: `thiserror` hard-codes that a field named
// `source` is the error source (and must be an `Error`), which these `String`
// fields are not.
#[derive(Debug)]
pub enum CompositionError {
    TypeNameCollision { source: String, prefixed: String },
    UnknownRemoteOperation {
        source: String,
        operation_type: String,
        operation: String,
    },
    UnknownRequiredField {
        parent_type: String,
        field_name: String,
        required: String,
    },
    UnknownParentType { parent_type: String, field_name: String },
    UnknownSource { source: String },
}

impl std::fmt::Display for CompositionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeNameCollision { source, prefixed } => write!(
                f,
                "remote type `{prefixed}` from source `{source}` collides with an existing type"
            ),
            Self::UnknownRemoteOperation {
                source,
                operation_type,
                operation,
            } => write!(
                f,
                "source `{source}` has no {operation_type} operation named `{operation}`"
            ),
            Self::UnknownRequiredField {
                parent_type,
                field_name,
                required,
            } => write!(
                f,
                "binding `{parent_type}.{field_name}` requires unknown parent field `{required}`"
            ),
            Self::UnknownParentType {
                parent_type,
                field_name,
            } => write!(
                f,
                "binding `{parent_type}.{field_name}` targets an unknown local type"
            ),
            Self::UnknownSource { source } => {
                write!(f, "binding references unknown source `{source}`")
            }
        }
    }
}

impl std::error::Error for CompositionError {}

/// A foreign schema to merge, with the prefix its type names get.
pub struct RemoteSource {
    pub name: String,
    pub prefix: String,
    pub registry: Registry,
}

impl RemoteSource {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>, registry: Registry) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            registry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteOperationType {
    #[default]
    Query,
    Mutation,
}

impl RemoteOperationType {
    fn as_str(self) -> &'static str {
        match self {
            RemoteOperationType::Query => "query",
            RemoteOperationType::Mutation => "mutation",
        }
    }
}

/// Mounts one foreign root operation as a field of a local type.
#[derive(Clone)]
pub struct RemoteBinding {
    source: String,
    operation: String,
    operation_type: RemoteOperationType,
    parent_type: String,
    field_name: String,
    field_type: Option<String>,
    arguments: Vec<MetaInputValue>,
    argument_mapper: Option<ArgumentMapper>,
    result_path: Option<String>,
    required_parent_fields: Vec<String>,
}

impl RemoteBinding {
    pub fn new(source: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            operation: operation.into(),
            operation_type: RemoteOperationType::Query,
            parent_type: String::new(),
            field_name: String::new(),
            field_type: None,
            arguments: Vec::new(),
            argument_mapper: None,
            result_path: None,
            required_parent_fields: Vec::new(),
        }
    }

    /// Binds a mutation operation instead of a query.
    #[must_use]
    pub fn mutation(mut self) -> Self {
        self.operation_type = RemoteOperationType::Mutation;
        self
    }

    #[must_use]
    pub fn mount(mut self, parent_type: impl Into<String>, field_name: impl Into<String>) -> Self {
        self.parent_type = parent_type.into();
        self.field_name = field_name.into();
        self
    }

    /// Overrides the mounted field's type. Defaults to the foreign field's
    /// type with the source prefix applied.
    #[must_use]
    pub fn field_type(mut self, ty: impl Into<String>) -> Self {
        self.field_type = Some(ty.into());
        self
    }

    /// Declares a local argument of the mounted field. Without any, the
    /// foreign operation's arguments are exposed as-is.
    #[must_use]
    pub fn argument(mut self, argument: MetaInputValue) -> Self {
        self.arguments.push(argument);
        self
    }

    #[must_use]
    pub fn map_arguments<F>(mut self, mapper: F) -> Self
    where
        F: Fn(ResolverArguments) -> ResolverArguments + Send + Sync + 'static,
    {
        self.argument_mapper = Some(std::sync::Arc::new(mapper));
        self
    }

    /// Unwraps the foreign result at a dotted key path.
    #[must_use]
    pub fn result_path(mut self, path: impl Into<String>) -> Self {
        self.result_path = Some(path.into());
        self
    }

    /// Requires a field of the parent payload to be present before
    /// delegating.
    #[must_use]
    pub fn requires(mut self, field: impl Into<String>) -> Self {
        self.required_parent_fields.push(field.into());
        self
    }
}

/// Builds the served registry out of the local one, the merged remote
/// sources, their bindings, and the version-scoped field removal.
pub struct SchemaComposer {
    local: Registry,
    sources: Vec<RemoteSource>,
    bindings: Vec<RemoteBinding>,
    serve_version: Option<String>,
}

impl SchemaComposer {
    pub fn new(local: Registry) -> Self {
        Self {
            local,
            sources: Vec::new(),
            bindings: Vec::new(),
            serve_version: None,
        }
    }

    #[must_use]
    pub fn merge_remote(mut self, source: RemoteSource) -> Self {
        self.sources.push(source);
        self
    }

    #[must_use]
    pub fn binding(mut self, binding: RemoteBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Drops every field deprecated at or before this version from the
    /// composed schema.
    #[must_use]
    pub fn serve_version(mut self, version: impl Into<String>) -> Self {
        self.serve_version = Some(version.into());
        self
    }

    pub fn compose(self) -> Result<Registry, CompositionError> {
        let mut registry = self.local;

        for source in &self.sources {
            merge_source(&mut registry, source)?;
        }
        for binding in &self.bindings {
            mount_binding(&mut registry, &self.sources, binding)?;
        }
        if let Some(version) = &self.serve_version {
            remove_fields_deprecated_since(&mut registry, version);
        }

        Ok(registry)
    }
}

fn merge_source(registry: &mut Registry, source: &RemoteSource) -> Result<(), CompositionError> {
    for (name, ty) in &source.registry.types {
        if !needs_prefix(name, &source.registry) {
            continue;
        }
        let prefixed = format!("{}{name}", source.prefix);
        if registry.types.contains_key(&prefixed) {
            return Err(CompositionError::TypeNameCollision {
                source: source.name.clone(),
                prefixed,
            });
        }

        let mut ty = ty.clone();
        ty.rename(prefixed);
        if let Some(fields) = ty.fields_mut() {
            for field in fields.values_mut() {
                field.ty = rewrite_type_ref(&field.ty, source);
                for argument in field.args.values_mut() {
                    argument.ty = rewrite_type_ref(&argument.ty, source);
                }
            }
        }
        if let MetaType::Interface(interface) = &mut ty {
            interface.possible_types = interface
                .possible_types
                .iter()
                .map(|possible| rewrite_type_ref(possible, source))
                .collect();
        }
        registry.insert_type(ty);
    }
    Ok(())
}

fn mount_binding(
    registry: &mut Registry,
    sources: &[RemoteSource],
    binding: &RemoteBinding,
) -> Result<(), CompositionError> {
    let source = sources
        .iter()
        .find(|source| source.name == binding.source)
        .ok_or_else(|| CompositionError::UnknownSource {
            source: binding.source.clone(),
        })?;

    let operation_field = foreign_root_field(source, binding).ok_or_else(|| CompositionError::UnknownRemoteOperation {
        source: binding.source.clone(),
        operation_type: binding.operation_type.as_str().to_string(),
        operation: binding.operation.clone(),
    })?;

    let field_type = binding
        .field_type
        .clone()
        .unwrap_or_else(|| rewrite_type_ref(&operation_field.ty, source));
    let arguments: IndexMap<String, MetaInputValue> = if binding.arguments.is_empty() {
        operation_field
            .args
            .values()
            .map(|argument| {
                let mut argument = argument.clone();
                argument.ty = rewrite_type_ref(&argument.ty, source);
                (argument.name.clone(), argument)
            })
            .collect()
    } else {
        binding
            .arguments
            .iter()
            .map(|argument| (argument.name.clone(), argument.clone()))
            .collect()
    };
    let resolver = Resolver::Remote(BoundOperation {
        source: binding.source.clone(),
        operation: binding.operation.clone(),
        resolver: Box::new(operation_field.resolver.clone()),
        argument_mapper: binding.argument_mapper.clone(),
        result_path: binding.result_path.clone(),
        required_parent_fields: binding.required_parent_fields.clone(),
    });

    let parent = registry
        .types
        .get_mut(&binding.parent_type)
        .and_then(MetaType::fields_mut)
        .ok_or_else(|| CompositionError::UnknownParentType {
            parent_type: binding.parent_type.clone(),
            field_name: binding.field_name.clone(),
        })?;
    for required in &binding.required_parent_fields {
        if !parent.contains_key(required) {
            return Err(CompositionError::UnknownRequiredField {
                parent_type: binding.parent_type.clone(),
                field_name: binding.field_name.clone(),
                required: required.clone(),
            });
        }
    }

    let mut field = MetaField::new(binding.field_name.clone(), field_type);
    field.args = arguments;
    field.resolver = resolver;
    parent.insert(field.name.clone(), field);
    Ok(())
}

fn foreign_root_field<'a>(source: &'a RemoteSource, binding: &RemoteBinding) -> Option<&'a MetaField> {
    let root_type_name = match binding.operation_type {
        RemoteOperationType::Query => Some(source.registry.query_type.as_str()),
        RemoteOperationType::Mutation => source.registry.mutation_type.as_deref(),
    }?;
    source.registry.types.get(root_type_name)?.field(&binding.operation)
}

fn needs_prefix(name: &str, source_registry: &Registry) -> bool {
    !BUILTIN_SCALARS.contains(&name) && !name.starts_with("__") && source_registry.types.contains_key(name)
}

fn rewrite_type_ref(type_ref: &str, source: &RemoteSource) -> String {
    let named = type_ref.named_type();
    if needs_prefix(named, &source.registry) {
        type_ref.replacen(named, &format!("{}{named}", source.prefix), 1)
    } else {
        type_ref.to_string()
    }
}

/// Removes every field whose deprecation marker is at or before `target`.
/// Fields deprecated without a version, and fields deprecated later than
/// `target`, stay. Structural and idempotent.
pub fn remove_fields_deprecated_since(registry: &mut Registry, target: &str) {
    for ty in registry.types.values_mut() {
        if let Some(fields) = ty.fields_mut() {
            fields.retain(|_, field| match &field.deprecation {
                crate::registry::Deprecation::Deprecated {
                    since_version: Some(since),
                    ..
                } => !version_lte(since, target),
                _ => true,
            });
        }
    }
}

/// Dotted numeric version comparison; missing components count as zero.
fn version_lte(version: &str, target: &str) -> bool {
    let parse = |value: &str| {
        value
            .split('.')
            .map(|part| part.trim().parse::<u64>().unwrap_or(0))
            .collect::<Vec<_>>()
    };
    let (left, right) = (parse(version), parse(target));
    for index in 0..left.len().max(right.len()) {
        let left = left.get(index).copied().unwrap_or(0);
        let right = right.get(index).copied().unwrap_or(0);
        match left.cmp(&right) {
            std::cmp::Ordering::Less => return true,
            std::cmp::Ordering::Greater => return false,
            std::cmp::Ordering::Equal => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_comparison_is_componentwise() {
        assert!(version_lte("1.2", "1.2"));
        assert!(version_lte("1.2", "1.10"));
        assert!(!version_lte("1.10", "1.2"));
        assert!(version_lte("2", "2.0.0"));
        assert!(!version_lte("2.0.1", "2"));
    }

    #[test]
    fn rewrite_keeps_wrappers_around_the_named_type() {
        let mut registry = Registry::new();
        registry.insert_type(MetaType::Object(crate::registry::ObjectType::new(
            "Order",
            [MetaField::new("id", "ID!")],
        )));
        let source = RemoteSource::new("exchange", "Exchange", registry);

        assert_eq!(rewrite_type_ref("[Order!]!", &source), "[ExchangeOrder!]!");
        assert_eq!(rewrite_type_ref("String!", &source), "String!");
    }
}
