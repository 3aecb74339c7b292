//! The single mutating walk over an operation or fragment: literal arguments
//! are blanked, everything orderable is sorted, and the fragment names the
//! selection spreads are collected for reachability.

use std::collections::HashSet;

use graphql_parser::query::{
    Directive, FragmentDefinition, Number, OperationDefinition, Selection, SelectionSet, TypeCondition,
};
use graphql_parser::schema::Value;

pub(crate) fn operation<'a>(operation: &mut OperationDefinition<'a, &'a str>, spreads: &mut HashSet<String>) {
    match operation {
        OperationDefinition::SelectionSet(set) => selection_set(set, spreads),
        OperationDefinition::Query(query) => {
            query.variable_definitions.sort_by(|a, b| a.name.cmp(b.name));
            directives(&mut query.directives);
            selection_set(&mut query.selection_set, spreads);
        }
        OperationDefinition::Mutation(mutation) => {
            mutation.variable_definitions.sort_by(|a, b| a.name.cmp(b.name));
            directives(&mut mutation.directives);
            selection_set(&mut mutation.selection_set, spreads);
        }
        OperationDefinition::Subscription(subscription) => {
            subscription.variable_definitions.sort_by(|a, b| a.name.cmp(b.name));
            directives(&mut subscription.directives);
            selection_set(&mut subscription.selection_set, spreads);
        }
    }
}

pub(crate) fn fragment<'a>(fragment: &mut FragmentDefinition<'a, &'a str>, spreads: &mut HashSet<String>) {
    directives(&mut fragment.directives);
    selection_set(&mut fragment.selection_set, spreads);
}

fn selection_set<'a>(set: &mut SelectionSet<'a, &'a str>, spreads: &mut HashSet<String>) {
    for selection in &mut set.items {
        match selection {
            Selection::Field(field) => {
                arguments(&mut field.arguments);
                directives(&mut field.directives);
                selection_set(&mut field.selection_set, spreads);
            }
            Selection::FragmentSpread(spread) => {
                directives(&mut spread.directives);
                spreads.insert(spread.fragment_name.to_string());
            }
            Selection::InlineFragment(inline) => {
                directives(&mut inline.directives);
                selection_set(&mut inline.selection_set, spreads);
            }
        }
    }
    set.items.sort_by(|a, b| selection_rank(a).cmp(&selection_rank(b)));
}

/// Fields sort first by name, then fragment spreads, then inline fragments
/// by their type condition.
fn selection_rank<'a>(selection: &Selection<'a, &'a str>) -> (u8, &'a str) {
    match selection {
        Selection::Field(field) => (0, field.name),
        Selection::FragmentSpread(spread) => (1, spread.fragment_name),
        Selection::InlineFragment(inline) => match &inline.type_condition {
            Some(TypeCondition::On(on)) => (2, *on),
            None => (2, ""),
        },
    }
}

fn directives<'a>(directives: &mut [Directive<'a, &'a str>]) {
    directives.sort_by(|a, b| a.name.cmp(b.name));
    for directive in directives {
        arguments(&mut directive.arguments);
    }
}

fn arguments<'a>(arguments: &mut [(&'a str, Value<'a, &'a str>)]) {
    arguments.sort_by(|(a, _), (b, _)| a.cmp(b));
    for (_, value) in arguments {
        scrub_value(value);
    }
}

fn scrub_value<'a>(value: &mut Value<'a, &'a str>) {
    match value {
        Value::String(text) => text.clear(),
        Value::Int(number) => *number = Number::from(0),
        Value::Float(number) => *number = 0.0,
        Value::List(items) => items.clear(),
        Value::Object(fields) => fields.clear(),
        Value::Variable(_) | Value::Enum(_) | Value::Boolean(_) | Value::Null => {}
    }
}
