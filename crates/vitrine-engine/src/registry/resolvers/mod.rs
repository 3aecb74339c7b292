//! Resolvers are data: every field in the registry carries a [`Resolver`]
//! value describing how its data is produced, and [`run_resolver`] is the
//! single dispatcher executing them. Keeping resolvers as plain data lets
//! composition passes rewrite them structurally: a bound remote operation
//! clones the foreign resolver, and the trace pass wraps resolvers without
//! knowing what they do.

mod remote;
mod resolved_value;
mod transformer;

pub use remote::{ArgumentMapper, BoundOperation};
pub use resolved_value::ResolvedValue;
pub use transformer::Transformer;

use std::{any::Any, fmt, future::Future, pin::Pin, sync::Arc};

use async_graphql_value::{ConstValue, Name};
use indexmap::IndexMap;
use tracing::{info_span, Instrument};

use crate::{
    context::{QueryEnv, QueryPath, SchemaEnv},
    error::Error,
    registry::{MetaField, MetaType},
};

#[derive(Debug, Clone)]
pub enum Resolver {
    /// The value is the correspondingly named key of the parent payload.
    Parent,
    Transformer(Transformer),
    Custom(CustomResolver),
    Remote(BoundOperation),
    /// Resolvers run in sequence, each receiving the previous output as its
    /// parent value.
    Composition(Vec<Resolver>),
    /// The inner resolver runs inside a span tagged with the parent type and
    /// field name.
    Traced(Box<Resolver>),
}

impl Resolver {
    pub fn is_parent(&self) -> bool {
        matches!(self, Resolver::Parent)
    }

    pub fn is_traced(&self) -> bool {
        matches!(self, Resolver::Traced(_))
    }
}

pub type BoxResolverFuture<'a> = Pin<Box<dyn Future<Output = Result<ResolvedValue, Error>> + Send + 'a>>;

pub type CustomResolverFn =
    dyn for<'a> Fn(ResolverContext<'a>, ResolverArguments, Option<ResolvedValue>) -> BoxResolverFuture<'a>
        + Send
        + Sync;

/// A named async function resolver.
#[derive(Clone)]
pub struct CustomResolver {
    pub name: String,
    func: Arc<CustomResolverFn>,
}

impl CustomResolver {
    pub fn new<F>(name: impl Into<String>, func: F) -> Resolver
    where
        F: for<'a> Fn(ResolverContext<'a>, ResolverArguments, Option<ResolvedValue>) -> BoxResolverFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        Resolver::Custom(Self {
            name: name.into(),
            func: Arc::new(func),
        })
    }
}

impl fmt::Debug for CustomResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomResolver").field("name", &self.name).finish()
    }
}

/// The slice of field context a resolver sees.
#[derive(Clone, Copy)]
pub struct ResolverContext<'a> {
    pub schema_env: &'a SchemaEnv,
    pub query_env: &'a QueryEnv,
    pub path: &'a QueryPath,
    pub parent_type: &'a MetaType,
    pub field: &'a MetaField,
}

impl<'a> ResolverContext<'a> {
    /// Looks up an injected value, request data first, then schema data.
    pub fn data<D: Any + Send + Sync>(&self) -> Result<&'a D, Error> {
        self.query_env
            .ctx_data
            .get::<D>()
            .or_else(|| self.schema_env.data.get::<D>())
            .ok_or_else(|| Error::new(format!("Data `{}` does not exist.", std::any::type_name::<D>())))
    }
}

/// The field's arguments, coerced to constants.
#[derive(Debug, Clone, Default)]
pub struct ResolverArguments(IndexMap<Name, ConstValue>);

impl ResolverArguments {
    pub fn get(&self, name: &str) -> Option<&ConstValue> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: Name, value: ConstValue) {
        self.0.insert(name, value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &ConstValue)> {
        self.0.iter()
    }

    /// The arguments as a JSON object, for forwarding to an upstream call.
    pub fn into_json(self) -> Result<serde_json::Value, Error> {
        let mut map = serde_json::Map::new();
        for (name, value) in self.0 {
            let value = value
                .into_json()
                .map_err(|error| Error::new(format!("invalid argument `{name}`: {error}")))?;
            map.insert(name.to_string(), value);
        }
        Ok(serde_json::Value::Object(map))
    }
}

impl FromIterator<(Name, ConstValue)> for ResolverArguments {
    fn from_iter<I: IntoIterator<Item = (Name, ConstValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[async_recursion::async_recursion]
pub async fn run_resolver<'a>(
    resolver: &'a Resolver,
    ctx: ResolverContext<'a>,
    args: &'a ResolverArguments,
    parent: Option<ResolvedValue>,
) -> Result<ResolvedValue, Error> {
    match resolver {
        Resolver::Parent => Ok(parent.unwrap_or_else(ResolvedValue::null)),
        Resolver::Transformer(transformer) => transformer.resolve(parent),
        Resolver::Custom(custom) => (custom.func)(ctx, args.clone(), parent).await,
        Resolver::Remote(operation) => operation.resolve(ctx, args, parent).await,
        Resolver::Composition(resolvers) => {
            let mut current = parent;
            for resolver in resolvers {
                current = Some(run_resolver(resolver, ctx, args, current).await?);
            }
            Ok(current.unwrap_or_else(ResolvedValue::null))
        }
        Resolver::Traced(inner) => {
            let span = info_span!(
                "resolver",
                parent_type = ctx.parent_type.name(),
                field_name = %ctx.field.name,
            );
            run_resolver(inner, ctx, args, parent).instrument(span).await
        }
    }
}
