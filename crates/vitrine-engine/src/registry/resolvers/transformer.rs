use super::{ResolvedValue, Resolver};
use crate::error::Error;

/// Pure transformations of an already-resolved payload.
#[derive(Debug, Clone)]
pub enum Transformer {
    /// Plucks the value at a dotted key path out of the parent payload.
    Select { path: String },
}

impl Transformer {
    pub fn select(path: impl Into<String>) -> Resolver {
        Resolver::Transformer(Transformer::Select { path: path.into() })
    }

    pub(super) fn resolve(&self, parent: Option<ResolvedValue>) -> Result<ResolvedValue, Error> {
        match self {
            Transformer::Select { path } => {
                let parent = parent.unwrap_or_else(ResolvedValue::null);
                let selected = select_path(parent.data_resolved(), path)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                Ok(ResolvedValue::new(selected))
            }
        }
    }
}

/// Walks a dotted key path through nested JSON objects.
pub(crate) fn select_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(value, |value, key| value.get(key))
}
