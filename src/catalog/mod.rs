//! Type catalog contract
//!
//! The generator and repairer never own type metadata. Everything they know
//! about a type (its fields, their cardinalities and bindings, which fields
//! form a union) is read through the [`TypeCatalog`] trait. The catalog is
//! read-only to this crate and is threaded explicitly through every call so
//! that two catalog versions can never be mixed inside one generation run.
//!
//! [`InMemoryCatalog`] is the reference implementation, loaded from a JSON
//! document. A FHIR-shaped sample catalog is bundled as
//! [`InMemoryCatalog::builtin`].

mod memory;

pub use self::memory::{CatalogDocument, InMemoryCatalog};

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Name of a declared type (primitive, complex data type, resource, or a
/// backbone element named `Owner.path`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(name: impl Into<String>) -> Self {
        TypeTag(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        TypeTag(name.to_string())
    }
}

impl From<String> for TypeTag {
    fn from(name: String) -> Self {
        TypeTag(name)
    }
}

impl Borrow<str> for TypeTag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Upper cardinality bound of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Cardinality {
    Bounded(u32),
    Unbounded,
}

impl Cardinality {
    pub fn one() -> Self {
        Cardinality::Bounded(1)
    }

    /// True when more than one value may appear, i.e. the field is a sequence.
    pub fn is_repeating(&self) -> bool {
        match self {
            Cardinality::Bounded(n) => *n > 1,
            Cardinality::Unbounded => true,
        }
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Cardinality::one()
    }
}

impl TryFrom<String> for Cardinality {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        if raw == "*" {
            return Ok(Cardinality::Unbounded);
        }
        match raw.parse::<u32>() {
            Ok(0) => Err("maximum cardinality must be at least 1".to_string()),
            Ok(n) => Ok(Cardinality::Bounded(n)),
            Err(_) => Err(format!("invalid maximum cardinality {:?}", raw)),
        }
    }
}

impl From<Cardinality> for String {
    fn from(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::Bounded(n) => n.to_string(),
            Cardinality::Unbounded => "*".to_string(),
        }
    }
}

/// Value-set constraint on a coded field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub value_set: String,
    /// Explicit `{system -> [codes]}` table. Ordered so seeded sampling is reproducible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codes: Option<BTreeMap<String, Vec<String>>>,
}

impl Binding {
    pub fn to_value_set(value_set: impl Into<String>) -> Self {
        Binding {
            value_set: value_set.into(),
            codes: None,
        }
    }

    pub fn with_codes(mut self, system: impl Into<String>, codes: &[&str]) -> Self {
        self.codes
            .get_or_insert_with(BTreeMap::new)
            .insert(system.into(), codes.iter().map(|c| c.to_string()).collect());
        self
    }

    /// The explicit code table, if one exists and holds at least one code.
    pub fn code_table(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        self.codes
            .as_ref()
            .filter(|table| table.values().any(|codes| !codes.is_empty()))
    }
}

/// Metadata for one field of a composite type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    pub key: String,
    #[serde(rename = "type")]
    pub type_tag: TypeTag,
    #[serde(default)]
    pub min: u32,
    #[serde(default)]
    pub max: Cardinality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_name: Option<String>,
    /// Allowed target types of a reference-shaped field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_types: Vec<TypeTag>,
}

impl FieldMeta {
    pub fn new(key: impl Into<String>, type_tag: impl Into<TypeTag>) -> Self {
        FieldMeta {
            key: key.into(),
            type_tag: type_tag.into(),
            min: 0,
            max: Cardinality::one(),
            binding: None,
            local_name: None,
            target_types: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.min = 1;
        self
    }

    pub fn repeating(mut self) -> Self {
        self.max = Cardinality::Unbounded;
        self
    }

    pub fn bound(mut self, binding: Binding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn targets(mut self, targets: &[&str]) -> Self {
        self.target_types = targets.iter().map(|t| TypeTag::from(*t)).collect();
        self
    }

    /// A field is forced when the schema makes it semantically mandatory:
    /// it has a non-zero minimum cardinality or carries a binding.
    pub fn is_forced(&self) -> bool {
        self.min != 0 || self.binding.is_some()
    }

    pub fn is_repeating(&self) -> bool {
        self.max.is_repeating()
    }

    pub fn serialized_name(&self) -> &str {
        self.local_name.as_deref().unwrap_or(&self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Primitive,
    Complex,
    Resource,
    Backbone,
}

/// One logical union field realized as several mutually exclusive fields,
/// e.g. `value` realized as `valueString`, `valueQuantity`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceGroup {
    pub key: String,
    pub suffixes: Vec<String>,
}

impl ChoiceGroup {
    pub fn new(key: impl Into<String>, suffixes: &[&str]) -> Self {
        ChoiceGroup {
            key: key.into(),
            suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn field_name(&self, suffix: &str) -> String {
        format!("{}{}", self.key, suffix)
    }

    pub fn realized_fields(&self) -> impl Iterator<Item = String> + '_ {
        self.suffixes.iter().map(move |s| self.field_name(s))
    }

    pub fn contains_field(&self, field: &str) -> bool {
        field
            .strip_prefix(self.key.as_str())
            .map_or(false, |suffix| self.suffixes.iter().any(|s| s == suffix))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    #[serde(rename = "name")]
    pub tag: TypeTag,
    pub kind: TypeKind,
    #[serde(default)]
    pub fields: Vec<FieldMeta>,
    /// Multiple-type groups: group key -> ordered realized suffixes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub choices: BTreeMap<String, Vec<String>>,
}

impl TypeDefinition {
    pub fn primitive(name: impl Into<TypeTag>) -> Self {
        TypeDefinition {
            tag: name.into(),
            kind: TypeKind::Primitive,
            fields: Vec::new(),
            choices: BTreeMap::new(),
        }
    }

    pub fn composite(name: impl Into<TypeTag>, kind: TypeKind, fields: Vec<FieldMeta>) -> Self {
        TypeDefinition {
            tag: name.into(),
            kind,
            fields,
            choices: BTreeMap::new(),
        }
    }

    pub fn with_choice(mut self, key: &str, suffixes: &[&str]) -> Self {
        self.choices
            .insert(key.to_string(), suffixes.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn choice_groups(&self) -> Vec<ChoiceGroup> {
        self.choices
            .iter()
            .map(|(key, suffixes)| ChoiceGroup {
                key: key.clone(),
                suffixes: suffixes.clone(),
            })
            .collect()
    }
}

/// Errors raised while loading or assembling a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed catalog document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("type {0} is declared more than once")]
    DuplicateType(TypeTag),

    #[error("choice group {group} of {owner} realizes {field}, which {owner} does not declare")]
    DanglingChoice {
        owner: TypeTag,
        group: String,
        field: String,
    },
}

/// Read-only lookup contract over type metadata.
///
/// Implementations must be side-effect free; the generator calls them from
/// any number of threads at once.
pub trait TypeCatalog: Send + Sync {
    fn definition(&self, tag: &TypeTag) -> Option<&TypeDefinition>;

    fn resolve_display_name(&self, system: &str, code: &str) -> Option<String>;

    /// Every resource-kind type, in declaration order.
    fn resource_types(&self) -> Vec<TypeTag>;

    fn fields_of(&self, tag: &TypeTag) -> Option<&[FieldMeta]> {
        self.definition(tag).map(|def| def.fields.as_slice())
    }

    fn multiple_type_groups_of(&self, tag: &TypeTag) -> Vec<ChoiceGroup> {
        self.definition(tag)
            .map(TypeDefinition::choice_groups)
            .unwrap_or_default()
    }

    fn kind_of(&self, tag: &TypeTag) -> Option<TypeKind> {
        self.definition(tag).map(|def| def.kind)
    }

    fn is_known_type(&self, tag: &TypeTag) -> bool {
        self.definition(tag).is_some()
    }

    fn is_primitive_type(&self, tag: &TypeTag) -> bool {
        self.kind_of(tag) == Some(TypeKind::Primitive)
    }
}
