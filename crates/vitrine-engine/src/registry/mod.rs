//! The executable schema: named types, their fields, and the resolver each
//! field carries.

pub mod resolvers;

use indexmap::IndexMap;

use resolvers::Resolver;

pub const BUILTIN_SCALARS: &[&str] = &["String", "Int", "Float", "Boolean", "ID"];

#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub types: IndexMap<String, MetaType>,
    pub directives: Vec<MetaDirective>,
    pub query_type: String,
    pub mutation_type: Option<String>,
}

impl Registry {
    /// A registry pre-populated with the built-in scalars and the executable
    /// directives the engine understands.
    pub fn new() -> Self {
        let mut registry = Self {
            types: IndexMap::new(),
            directives: vec![
                MetaDirective::new("skip", &["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"]),
                MetaDirective::new("include", &["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"]),
                MetaDirective::new(crate::optional_fields::OPTIONAL_FIELD_DIRECTIVE, &["FIELD"]),
            ],
            query_type: "Query".to_string(),
            mutation_type: None,
        };
        for scalar in BUILTIN_SCALARS {
            registry.insert_type(MetaType::Scalar(ScalarType::new(*scalar)));
        }
        registry
    }

    pub fn insert_type(&mut self, ty: MetaType) {
        self.types.insert(ty.name().to_string(), ty);
    }

    /// Looks up the named type behind a type reference such as `[Artwork!]!`.
    pub fn lookup_type(&self, type_ref: &str) -> Option<&MetaType> {
        self.types.get(type_ref.named_type())
    }
}

#[derive(Debug, Clone)]
pub struct MetaDirective {
    pub name: String,
    pub locations: Vec<String>,
}

impl MetaDirective {
    fn new(name: &str, locations: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            locations: locations.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MetaType {
    Scalar(ScalarType),
    Object(ObjectType),
    Interface(InterfaceType),
}

impl MetaType {
    pub fn name(&self) -> &str {
        match self {
            MetaType::Scalar(inner) => &inner.name,
            MetaType::Object(inner) => &inner.name,
            MetaType::Interface(inner) => &inner.name,
        }
    }

    pub fn rename(&mut self, name: String) {
        match self {
            MetaType::Scalar(inner) => inner.name = name,
            MetaType::Object(inner) => inner.name = name,
            MetaType::Interface(inner) => inner.name = name,
        }
    }

    pub fn field(&self, name: &str) -> Option<&MetaField> {
        self.fields().and_then(|fields| fields.get(name))
    }

    pub fn fields(&self) -> Option<&IndexMap<String, MetaField>> {
        match self {
            MetaType::Object(inner) => Some(&inner.fields),
            MetaType::Interface(inner) => Some(&inner.fields),
            MetaType::Scalar(_) => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut IndexMap<String, MetaField>> {
        match self {
            MetaType::Object(inner) => Some(&mut inner.fields),
            MetaType::Interface(inner) => Some(&mut inner.fields),
            MetaType::Scalar(_) => None,
        }
    }

    /// Objects and interfaces take a selection set; scalars do not.
    pub fn is_composite(&self) -> bool {
        matches!(self, MetaType::Object(_) | MetaType::Interface(_))
    }

    pub fn is_interface(&self) -> bool {
        matches!(self, MetaType::Interface(_))
    }
}

#[derive(Debug, Clone)]
pub struct ScalarType {
    pub name: String,
    pub description: Option<String>,
}

impl ScalarType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, MetaField>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = MetaField>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: fields.into_iter().map(|field| (field.name.clone(), field)).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterfaceType {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, MetaField>,
    pub possible_types: Vec<String>,
}

impl InterfaceType {
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = MetaField>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: fields.into_iter().map(|field| (field.name.clone(), field)).collect(),
            possible_types: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_possible_types(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.possible_types = types.into_iter().collect();
        self
    }
}

#[derive(Debug, Clone)]
pub struct MetaField {
    pub name: String,
    pub description: Option<String>,
    pub args: IndexMap<String, MetaInputValue>,
    pub ty: String,
    pub deprecation: Deprecation,
    pub resolver: Resolver,
}

impl MetaField {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            args: IndexMap::new(),
            ty: ty.into(),
            deprecation: Deprecation::NoDeprecated,
            resolver: Resolver::Parent,
        }
    }

    #[must_use]
    pub fn with_argument(mut self, argument: MetaInputValue) -> Self {
        self.args.insert(argument.name.clone(), argument);
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_deprecation(mut self, deprecation: Deprecation) -> Self {
        self.deprecation = deprecation;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MetaInputValue {
    pub name: String,
    pub ty: String,
    pub description: Option<String>,
}

impl MetaInputValue {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Deprecation {
    #[default]
    NoDeprecated,
    Deprecated {
        since_version: Option<String>,
        reason: Option<String>,
    },
}

impl Deprecation {
    pub fn since(version: impl Into<String>) -> Self {
        Deprecation::Deprecated {
            since_version: Some(version.into()),
            reason: None,
        }
    }
}

/// String-level inspection of type references like `[Artwork!]!`.
pub trait TypeReference {
    fn is_non_null(&self) -> bool;
    fn is_nullable(&self) -> bool {
        !self.is_non_null()
    }
    fn is_list(&self) -> bool;
    fn list_item_type(&self) -> Option<&str>;
    fn named_type(&self) -> &str;
}

impl TypeReference for str {
    fn is_non_null(&self) -> bool {
        self.ends_with('!')
    }

    fn is_list(&self) -> bool {
        self.trim_end_matches('!').starts_with('[')
    }

    fn list_item_type(&self) -> Option<&str> {
        self.trim_end_matches('!')
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
    }

    fn named_type(&self) -> &str {
        self.trim_matches(|c| c == '[' || c == ']' || c == '!')
    }
}
