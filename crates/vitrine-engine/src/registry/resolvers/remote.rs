use std::{fmt, sync::Arc};

use super::{run_resolver, transformer::select_path, ResolvedValue, Resolver, ResolverArguments, ResolverContext};
use crate::error::Error;

/// Rewrites the local field's arguments into the argument shape the foreign
/// operation expects.
pub type ArgumentMapper = Arc<dyn Fn(ResolverArguments) -> ResolverArguments + Send + Sync>;

/// A foreign root operation mounted as a local field.
///
/// Holds a clone of the foreign operation's own resolver; delegation maps
/// the arguments, runs that resolver against the same request context, and
/// unwraps the result. The foreign registry is never mutated.
#[derive(Clone)]
pub struct BoundOperation {
    pub source: String,
    pub operation: String,
    pub(crate) resolver: Box<Resolver>,
    pub(crate) argument_mapper: Option<ArgumentMapper>,
    pub(crate) result_path: Option<String>,
    pub(crate) required_parent_fields: Vec<String>,
}

impl fmt::Debug for BoundOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundOperation")
            .field("source", &self.source)
            .field("operation", &self.operation)
            .field("result_path", &self.result_path)
            .field("required_parent_fields", &self.required_parent_fields)
            .finish()
    }
}

impl BoundOperation {
    pub(super) async fn resolve(
        &self,
        ctx: ResolverContext<'_>,
        args: &ResolverArguments,
        parent: Option<ResolvedValue>,
    ) -> Result<ResolvedValue, Error> {
        for required in &self.required_parent_fields {
            let present = parent
                .as_ref()
                .is_some_and(|parent| parent.data_resolved().get(required).is_some());
            if !present {
                return Err(Error::new(format!(
                    "cannot delegate `{}` to `{}.{}`: parent value is missing `{required}`",
                    ctx.field.name, self.source, self.operation,
                )));
            }
        }

        let mapped = match &self.argument_mapper {
            Some(mapper) => mapper(args.clone()),
            None => args.clone(),
        };

        let resolved = run_resolver(&self.resolver, ctx, &mapped, parent).await?;

        Ok(match &self.result_path {
            Some(path) => ResolvedValue::new(
                select_path(resolved.data_resolved(), path)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null),
            ),
            None => resolved,
        })
    }
}
