use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    ops::Deref,
    sync::{Arc, Mutex},
};

use async_graphql_parser::types::{Field, FragmentDefinition, OperationDefinition, SelectionSet};
use async_graphql_parser::Positioned;
use async_graphql_value::{Name, Variables};

use crate::{
    error::{Error, PathSegment, Pos, ServerError, ServerResult},
    optional_fields::OptionalFieldMarker,
    registry::{resolvers::ResolverArguments, MetaField, MetaType},
};

/// A type-keyed map for request- and schema-scoped injected values.
#[derive(Default)]
pub struct Data(HashMap<TypeId, Box<dyn Any + Send + Sync>>);

impl Data {
    pub fn insert<D: Any + Send + Sync>(&mut self, data: D) {
        self.0.insert(TypeId::of::<D>(), Box::new(data));
    }

    pub(crate) fn get<D: Any + Send + Sync>(&self) -> Option<&D> {
        self.0.get(&TypeId::of::<D>()).and_then(|d| d.downcast_ref::<D>())
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Data").finish()
    }
}

pub struct QueryEnvInner {
    pub operation: Positioned<OperationDefinition>,
    pub operation_name: Option<String>,
    pub fragments: HashMap<Name, Positioned<FragmentDefinition>>,
    pub variables: Variables,
    pub ctx_data: Arc<Data>,
    pub errors: Mutex<Vec<ServerError>>,
    pub optional_markers: Vec<OptionalFieldMarker>,
}

/// The per-request execution environment, shared by every context in the
/// resolver tree.
#[derive(Clone)]
pub struct QueryEnv(Arc<QueryEnvInner>);

impl Deref for QueryEnv {
    type Target = QueryEnvInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl QueryEnv {
    pub fn new(inner: QueryEnvInner) -> Self {
        Self(Arc::new(inner))
    }

    /// Whether `path` is exactly the root of an `@optionalField` subtree.
    /// List indices are transparent: a marker put on a field inside a list
    /// matches every element's instance of that field.
    pub fn is_optional_root(&self, path: &QueryPath) -> bool {
        let keys = path.field_keys();
        self.optional_markers
            .iter()
            .any(|marker| marker.path.len() == keys.len() && marker.path.iter().zip(&keys).all(|(a, b)| a == b))
    }
}

pub struct SchemaEnvInner {
    pub registry: crate::registry::Registry,
    pub data: Data,
}

/// The schema-lifetime environment: the composed registry plus values
/// injected at build time.
#[derive(Clone)]
pub struct SchemaEnv(Arc<SchemaEnvInner>);

impl Deref for SchemaEnv {
    type Target = SchemaEnvInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl SchemaEnv {
    pub fn new(inner: SchemaEnvInner) -> Self {
        Self(Arc::new(inner))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPathSegment {
    Field(String),
    Index(usize),
}

/// The response path of the value currently being resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPath(Vec<QueryPathSegment>);

impl QueryPath {
    pub fn child(&self, segment: QueryPathSegment) -> Self {
        let mut path = self.0.clone();
        path.push(segment);
        Self(path)
    }

    /// The field names along the path, skipping list indices.
    pub fn field_keys(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter_map(|segment| match segment {
                QueryPathSegment::Field(name) => Some(name.as_str()),
                QueryPathSegment::Index(_) => None,
            })
            .collect()
    }

    pub fn to_error_path(&self) -> Vec<PathSegment> {
        self.0
            .iter()
            .map(|segment| match segment {
                QueryPathSegment::Field(name) => PathSegment::Field(name.clone()),
                QueryPathSegment::Index(index) => PathSegment::Index(*index),
            })
            .collect()
    }
}

/// Context for resolving a selection set against a composite type.
#[derive(Clone)]
pub struct ContextSelectionSet<'a> {
    pub ty: &'a MetaType,
    pub item: &'a Positioned<SelectionSet>,
    pub schema_env: &'a SchemaEnv,
    pub query_env: &'a QueryEnv,
    pub path: QueryPath,
}

/// Context for resolving a single field.
#[derive(Clone)]
pub struct ContextField<'a> {
    pub parent_type: &'a MetaType,
    pub field: &'a MetaField,
    pub item: &'a Positioned<Field>,
    pub schema_env: &'a SchemaEnv,
    pub query_env: &'a QueryEnv,
    pub path: QueryPath,
}

impl<'a> ContextSelectionSet<'a> {
    pub fn add_error(&self, error: ServerError) {
        self.query_env.errors.lock().expect("error sink poisoned").push(error);
    }
}

impl<'a> ContextField<'a> {
    /// Looks up an injected value, request data first, then schema data.
    pub fn data<D: Any + Send + Sync>(&self) -> Result<&'a D, Error> {
        self.query_env
            .ctx_data
            .get::<D>()
            .or_else(|| self.schema_env.data.get::<D>())
            .ok_or_else(|| Error::new(format!("Data `{}` does not exist.", std::any::type_name::<D>())))
    }

    pub fn add_error(&self, error: ServerError) {
        self.query_env.errors.lock().expect("error sink poisoned").push(error);
    }

    pub fn response_key(&self) -> &str {
        self.item
            .node
            .alias
            .as_ref()
            .map(|alias| alias.node.as_str())
            .unwrap_or_else(|| self.item.node.name.node.as_str())
    }

    pub fn pos(&self) -> Pos {
        self.item.pos.into()
    }

    /// Attaches this field's response path to an error that does not carry
    /// one yet. Errors bubbled up from deeper fields keep their own path.
    pub fn set_error_path(&self, mut error: ServerError) -> ServerError {
        if error.path.is_empty() {
            error.path = self.path.to_error_path();
        }
        error
    }

    /// The field's arguments with variables substituted. An unbound variable
    /// resolves to null.
    pub fn resolver_arguments(&self) -> ServerResult<ResolverArguments> {
        let mut arguments = ResolverArguments::default();
        for (name, value) in &self.item.node.arguments {
            let value = value.node.clone().into_const_with(
                |variable| -> Result<async_graphql_value::ConstValue, ServerError> {
                    Ok(self
                        .query_env
                        .variables
                        .get(&variable)
                        .cloned()
                        .unwrap_or(async_graphql_value::ConstValue::Null))
                },
            )?;
            arguments.insert(name.node.clone(), value);
        }
        Ok(arguments)
    }
}
