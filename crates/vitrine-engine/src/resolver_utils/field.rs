use async_recursion::async_recursion;
use futures_util::future::try_join_all;

use super::container::resolve_container;
use crate::{
    context::{ContextField, ContextSelectionSet, QueryPath, QueryPathSegment},
    error::{ServerError, ServerResult},
    registry::{
        resolvers::{run_resolver, ResolvedValue, ResolverContext},
        TypeReference,
    },
};

/// Resolves one field and applies the null-bubbling rule: a failing nullable
/// field becomes null with a recorded error, a failing non-null field
/// propagates the error to its parent. The root of an `@optionalField`
/// subtree is treated as nullable regardless of its declared type.
pub(super) async fn resolve_field(ctx: ContextField<'_>, parent: Option<ResolvedValue>) -> ServerResult<serde_json::Value> {
    match resolve_field_inner(&ctx, parent).await {
        Ok(value) => Ok(value),
        Err(error) if ctx.field.ty.as_str().is_nullable() || ctx.query_env.is_optional_root(&ctx.path) => {
            ctx.add_error(ctx.set_error_path(error));
            Ok(serde_json::Value::Null)
        }
        Err(error) => Err(ctx.set_error_path(error)),
    }
}

async fn resolve_field_inner(ctx: &ContextField<'_>, parent: Option<ResolvedValue>) -> ServerResult<serde_json::Value> {
    let args = ctx.resolver_arguments()?;

    let resolved = if ctx.field.resolver.is_parent() {
        // the parent payload keys values by field name, not response key
        parent
            .as_ref()
            .and_then(|parent| parent.get_field(ctx.item.node.name.node.as_str()))
            .unwrap_or_else(ResolvedValue::null)
    } else {
        let resolver_ctx = ResolverContext {
            schema_env: ctx.schema_env,
            query_env: ctx.query_env,
            path: &ctx.path,
            parent_type: ctx.parent_type,
            field: ctx.field,
        };
        run_resolver(&ctx.field.resolver, resolver_ctx, &args, parent)
            .await
            .map_err(|error| error.into_server_error(ctx.pos()))?
    };

    resolve_output(ctx, &ctx.field.ty, ctx.path.clone(), resolved).await
}

/// Shapes a resolved payload according to the field's type reference,
/// recursing through non-null and list wrappers down to the named type.
#[async_recursion]
async fn resolve_output<'ctx>(
    ctx: &'ctx ContextField<'ctx>,
    ty: &'ctx str,
    path: QueryPath,
    value: ResolvedValue,
) -> ServerResult<serde_json::Value> {
    if ty.is_non_null() {
        let inner = &ty[..ty.len() - 1];
        let resolved = resolve_output(ctx, inner, path.clone(), value).await?;
        if resolved.is_null() {
            let mut error = ServerError::new(
                format!(
                    "Cannot return null for non-nullable field {}.{}.",
                    ctx.parent_type.name(),
                    ctx.field.name,
                ),
                Some(ctx.pos()),
            );
            error.path = path.to_error_path();
            return Err(error);
        }
        return Ok(resolved);
    }

    if value.is_null() {
        return Ok(serde_json::Value::Null);
    }

    if let Some(item_ty) = ty.list_item_type() {
        let items = match value.take() {
            serde_json::Value::Array(items) => items,
            other => {
                let mut error = ServerError::new(
                    format!(
                        "Field {}.{} resolved to a non-list value for list type {ty}: {other}",
                        ctx.parent_type.name(),
                        ctx.field.name,
                    ),
                    Some(ctx.pos()),
                );
                error.path = path.to_error_path();
                return Err(error);
            }
        };

        let futures = items.into_iter().enumerate().map(|(index, item)| {
            let item_path = path.child(QueryPathSegment::Index(index));
            async move {
                match resolve_output(ctx, item_ty, item_path.clone(), ResolvedValue::new(item)).await {
                    Err(mut error) if item_ty.is_nullable() => {
                        if error.path.is_empty() {
                            error.path = item_path.to_error_path();
                        }
                        ctx.add_error(error);
                        Ok(serde_json::Value::Null)
                    }
                    other => other,
                }
            }
        });
        let values = try_join_all(futures).await?;
        return Ok(serde_json::Value::Array(values));
    }

    match ctx.schema_env.registry.lookup_type(ty) {
        Some(meta) if meta.is_composite() => {
            let ctx_set = ContextSelectionSet {
                ty: meta,
                item: &ctx.item.node.selection_set,
                schema_env: ctx.schema_env,
                query_env: ctx.query_env,
                path,
            };
            resolve_container(&ctx_set, value).await
        }
        _ => Ok(value.take()),
    }
}
