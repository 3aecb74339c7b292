use std::sync::Arc;

/// A resolver output: upstream JSON shared cheaply down the resolver tree.
#[derive(Debug, Clone)]
pub struct ResolvedValue {
    data: Arc<serde_json::Value>,
}

impl ResolvedValue {
    pub fn new(value: serde_json::Value) -> Self {
        Self { data: Arc::new(value) }
    }

    pub fn null() -> Self {
        Self::new(serde_json::Value::Null)
    }

    pub fn data_resolved(&self) -> &serde_json::Value {
        &self.data
    }

    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// The value behind a key of an object payload, if present.
    pub fn get_field(&self, name: &str) -> Option<ResolvedValue> {
        self.data.get(name).cloned().map(ResolvedValue::new)
    }

    pub fn take(self) -> serde_json::Value {
        Arc::try_unwrap(self.data).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl From<serde_json::Value> for ResolvedValue {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}
