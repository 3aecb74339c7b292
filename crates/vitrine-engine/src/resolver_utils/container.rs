use async_graphql_parser::types::{Field, Selection, SelectionSet, TypeCondition};
use async_graphql_parser::Positioned;
use futures_util::future::{try_join_all, BoxFuture};

use super::field::resolve_field;
use crate::{
    context::{ContextField, ContextSelectionSet, QueryPathSegment},
    error::{ServerError, ServerResult},
    registry::{resolvers::ResolvedValue, MetaType},
};

pub(crate) async fn resolve_root_container(ctx: &ContextSelectionSet<'_>) -> ServerResult<serde_json::Value> {
    resolve_container_inner(ctx, None, true).await
}

/// Mutation root fields run one after another, each starting only once the
/// previous one settled.
pub(crate) async fn resolve_root_container_serial(ctx: &ContextSelectionSet<'_>) -> ServerResult<serde_json::Value> {
    resolve_container_inner(ctx, None, false).await
}

pub(crate) async fn resolve_container(
    ctx: &ContextSelectionSet<'_>,
    parent: ResolvedValue,
) -> ServerResult<serde_json::Value> {
    resolve_container_inner(ctx, Some(parent), true).await
}

async fn resolve_container_inner<'a>(
    ctx: &ContextSelectionSet<'a>,
    parent: Option<ResolvedValue>,
    parallel: bool,
) -> ServerResult<serde_json::Value> {
    let mut futures = Vec::new();
    collect_fields(ctx, ctx.ty, ctx.item, parent.as_ref(), &mut futures)?;

    let results = if parallel {
        try_join_all(futures).await?
    } else {
        let mut results = Vec::with_capacity(futures.len());
        for future in futures {
            results.push(future.await?);
        }
        results
    };

    let mut object = serde_json::Map::new();
    for (key, value) in results {
        match object.entry(key) {
            serde_json::map::Entry::Vacant(entry) => {
                entry.insert(value);
            }
            serde_json::map::Entry::Occupied(mut entry) => merge_values(entry.get_mut(), value),
        }
    }
    Ok(serde_json::Value::Object(object))
}

type FieldFuture<'a> = BoxFuture<'a, ServerResult<(String, serde_json::Value)>>;

fn collect_fields<'a>(
    ctx: &ContextSelectionSet<'a>,
    ty: &'a MetaType,
    selection_set: &'a Positioned<SelectionSet>,
    parent: Option<&ResolvedValue>,
    futures: &mut Vec<FieldFuture<'a>>,
) -> ServerResult<()> {
    for selection in &selection_set.node.items {
        match &selection.node {
            Selection::Field(field) => {
                let key = response_key(field);

                if field.node.name.node.as_str() == "__typename" {
                    let type_name = concrete_type_name(ty, parent);
                    futures.push(Box::pin(async move { Ok((key, serde_json::Value::String(type_name))) }));
                    continue;
                }

                let meta_field = ty.field(field.node.name.node.as_str()).ok_or_else(|| {
                    ServerError::new(
                        format!(r#"Unknown field "{}" on type "{}"."#, field.node.name.node, ty.name()),
                        Some(field.pos.into()),
                    )
                })?;

                let field_ctx = ContextField {
                    parent_type: ty,
                    field: meta_field,
                    item: field,
                    schema_env: ctx.schema_env,
                    query_env: ctx.query_env,
                    path: ctx.path.child(QueryPathSegment::Field(key.clone())),
                };
                let parent = parent.cloned();
                futures.push(Box::pin(async move {
                    let value = resolve_field(field_ctx, parent).await?;
                    Ok((key, value))
                }));
            }
            Selection::FragmentSpread(spread) => {
                let fragment = ctx
                    .query_env
                    .fragments
                    .get(&spread.node.fragment_name.node)
                    .ok_or_else(|| {
                        ServerError::new(
                            format!(r#"Unknown fragment "{}"."#, spread.node.fragment_name.node),
                            Some(spread.pos.into()),
                        )
                    })?;
                let TypeCondition { on: condition } = &fragment.node.type_condition.node;
                if fragment_applies(ty, condition.node.as_str(), parent) {
                    let fragment_ty = condition_type(ctx, ty, condition.node.as_str(), spread.pos)?;
                    collect_fields(ctx, fragment_ty, &fragment.node.selection_set, parent, futures)?;
                }
            }
            Selection::InlineFragment(inline) => {
                let condition = inline
                    .node
                    .type_condition
                    .as_ref()
                    .map(|condition| condition.node.on.node.as_str());
                match condition {
                    Some(condition) if fragment_applies(ty, condition, parent) => {
                        let fragment_ty = condition_type(ctx, ty, condition, inline.pos)?;
                        collect_fields(ctx, fragment_ty, &inline.node.selection_set, parent, futures)?;
                    }
                    Some(_) => {}
                    None => collect_fields(ctx, ty, &inline.node.selection_set, parent, futures)?,
                }
            }
        }
    }
    Ok(())
}

fn response_key(field: &Positioned<Field>) -> String {
    field
        .node
        .alias
        .as_ref()
        .map(|alias| alias.node.to_string())
        .unwrap_or_else(|| field.node.name.node.to_string())
}

/// The concrete type name of the value being resolved. Interface-typed
/// payloads carry it in their `__typename` key; without one the static type
/// name is all there is.
fn concrete_type_name(ty: &MetaType, parent: Option<&ResolvedValue>) -> String {
    if ty.is_interface() {
        if let Some(name) = parent
            .and_then(|parent| parent.data_resolved().get("__typename"))
            .and_then(serde_json::Value::as_str)
        {
            return name.to_string();
        }
    }
    ty.name().to_string()
}

fn fragment_applies(ty: &MetaType, condition: &str, parent: Option<&ResolvedValue>) -> bool {
    ty.name() == condition || concrete_type_name(ty, parent) == condition
}

fn condition_type<'a>(
    ctx: &ContextSelectionSet<'a>,
    ty: &'a MetaType,
    condition: &str,
    pos: async_graphql_parser::Pos,
) -> ServerResult<&'a MetaType> {
    if ty.name() == condition {
        return Ok(ty);
    }
    ctx.schema_env
        .registry
        .types
        .get(condition)
        .ok_or_else(|| ServerError::new(format!(r#"Unknown type "{condition}"."#), Some(pos.into())))
}

/// Duplicate response keys merge deeply when both sides are objects, the
/// standard selection-merging rule.
fn merge_values(target: &mut serde_json::Value, value: serde_json::Value) {
    match (target, value) {
        (serde_json::Value::Object(target), serde_json::Value::Object(source)) => {
            for (key, value) in source {
                match target.entry(key) {
                    serde_json::map::Entry::Vacant(entry) => {
                        entry.insert(value);
                    }
                    serde_json::map::Entry::Occupied(mut entry) => merge_values(entry.get_mut(), value),
                }
            }
        }
        (target, value) => *target = value,
    }
}
