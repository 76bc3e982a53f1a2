//! Generated instance model
//!
//! An [`Instance`] is an owned tree: every nested composite is a distinct
//! allocation, so mutating one branch can never be observed through another.
//! Fields the generator decided not to populate are recorded as
//! [`Value::Absent`] rather than dropped, which lets callers distinguish "the
//! type declares this field and it is deliberately empty" from "the type has
//! no such field".

use crate::catalog::{ChoiceGroup, TypeCatalog, TypeTag};
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::BTreeMap;

/// A primitive value. Textual variants keep their primitive flavor so repair
/// rules can tell a date from a plain string.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    Date(String),
    DateTime(String),
    Time(String),
    Uri(String),
    Code(String),
    Id(String),
    Binary(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s)
            | Scalar::Date(s)
            | Scalar::DateTime(s)
            | Scalar::Time(s)
            | Scalar::Uri(s)
            | Scalar::Code(s)
            | Scalar::Id(s)
            | Scalar::Binary(s) => Some(s),
            Scalar::Boolean(_) | Scalar::Integer(_) | Scalar::Decimal(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Decimal(d) => Some(*d),
            Scalar::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Same primitive flavor, new text. Non-textual scalars are returned unchanged.
    pub fn with_text(&self, text: impl Into<String>) -> Scalar {
        let text = text.into();
        match self {
            Scalar::String(_) => Scalar::String(text),
            Scalar::Date(_) => Scalar::Date(text),
            Scalar::DateTime(_) => Scalar::DateTime(text),
            Scalar::Time(_) => Scalar::Time(text),
            Scalar::Uri(_) => Scalar::Uri(text),
            Scalar::Code(_) => Scalar::Code(text),
            Scalar::Id(_) => Scalar::Id(text),
            Scalar::Binary(_) => Scalar::Binary(text),
            other => other.clone(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Scalar::Boolean(b) => JsonValue::Bool(*b),
            Scalar::Integer(i) => JsonValue::Number((*i).into()),
            Scalar::Decimal(d) => Number::from_f64(*d).map_or(JsonValue::Null, JsonValue::Number),
            textual => JsonValue::String(textual.as_str().unwrap_or_default().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Absent,
    Scalar(Scalar),
    Composite(Instance),
    List(Vec<Value>),
}

impl Value {
    pub fn is_present(&self) -> bool {
        match self {
            Value::Absent => false,
            Value::List(items) => items.iter().any(Value::is_present),
            Value::Scalar(_) | Value::Composite(_) => true,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// The scalar itself, or the first scalar of a sequence.
    pub fn first_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::List(items) => items.iter().find_map(Value::first_scalar),
            _ => None,
        }
    }

    pub fn first_scalar_mut(&mut self) -> Option<&mut Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::List(items) => items.iter_mut().find_map(Value::first_scalar_mut),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Composite(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_instance_mut(&mut self) -> Option<&mut Instance> {
        match self {
            Value::Composite(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Every nested instance: the composite itself, or each composite element of a sequence.
    pub fn instances(&self) -> Vec<&Instance> {
        match self {
            Value::Composite(instance) => vec![instance],
            Value::List(items) => items.iter().filter_map(Value::as_instance).collect(),
            _ => Vec::new(),
        }
    }

    pub fn instances_mut(&mut self) -> Vec<&mut Instance> {
        match self {
            Value::Composite(instance) => vec![instance],
            Value::List(items) => items.iter_mut().filter_map(Value::as_instance_mut).collect(),
            _ => Vec::new(),
        }
    }

    fn to_json(&self, catalog: &dyn TypeCatalog) -> Option<JsonValue> {
        match self {
            Value::Absent => None,
            Value::Scalar(s) => Some(s.to_json()),
            Value::Composite(instance) => Some(instance.to_json(catalog)),
            Value::List(items) => {
                let rendered: Vec<JsonValue> =
                    items.iter().filter_map(|v| v.to_json(catalog)).collect();
                if rendered.is_empty() {
                    None
                } else {
                    Some(JsonValue::Array(rendered))
                }
            }
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Value::Scalar(scalar)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Value::Composite(instance)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Vec<Instance>> for Value {
    fn from(items: Vec<Instance>) -> Self {
        Value::List(items.into_iter().map(Value::Composite).collect())
    }
}

/// One selected representation of a union field. Can only be built from a
/// suffix the group actually enumerates.
#[derive(Debug, Clone, Copy)]
pub struct ChoiceSelection<'g> {
    group: &'g ChoiceGroup,
    index: usize,
}

impl<'g> ChoiceSelection<'g> {
    pub fn new(group: &'g ChoiceGroup, suffix: &str) -> Option<Self> {
        let index = group.suffixes.iter().position(|s| s == suffix)?;
        Some(ChoiceSelection { group, index })
    }

    pub fn nth(group: &'g ChoiceGroup, index: usize) -> Option<Self> {
        if index < group.suffixes.len() {
            Some(ChoiceSelection { group, index })
        } else {
            None
        }
    }

    pub fn suffix(&self) -> &'g str {
        &self.group.suffixes[self.index]
    }

    pub fn field_name(&self) -> String {
        self.group.field_name(self.suffix())
    }

    /// Realized field names of every other member of the group.
    pub fn sibling_fields(&self) -> impl Iterator<Item = String> + 'g {
        let group = self.group;
        let index = self.index;
        group
            .suffixes
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != index)
            .map(move |(_, s)| group.field_name(s))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    type_tag: TypeTag,
    fields: BTreeMap<String, Value>,
}

impl Instance {
    pub fn new(type_tag: impl Into<TypeTag>) -> Self {
        Instance {
            type_tag: type_tag.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    /// Builder-style `set`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Mark a declared field as explicitly absent. Undeclared keys are left alone.
    pub fn clear(&mut self, key: &str) {
        if let Some(slot) = self.fields.get_mut(key) {
            *slot = Value::Absent;
        }
    }

    /// Remove a field's value, leaving it explicitly absent.
    pub fn take(&mut self, key: &str) -> Option<Value> {
        let slot = self.fields.get_mut(key)?;
        match std::mem::replace(slot, Value::Absent) {
            Value::Absent => None,
            value => Some(value),
        }
    }

    pub fn swap(&mut self, a: &str, b: &str) {
        let first = self.fields.remove(a).unwrap_or(Value::Absent);
        let second = self.fields.remove(b).unwrap_or(Value::Absent);
        self.fields.insert(a.to_string(), second);
        self.fields.insert(b.to_string(), first);
    }

    /// The stored value, including explicit `Absent` markers.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// The value of a populated field; `None` for missing and absent fields alike.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| v.is_present())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key).filter(|v| v.is_present())
    }

    pub fn is_present(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn any_present(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.is_present(k))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn present_keys(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, v)| v.is_present())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn scalar(&self, key: &str) -> Option<&Scalar> {
        self.get(key)?.first_scalar()
    }

    pub fn scalar_mut(&mut self, key: &str) -> Option<&mut Scalar> {
        self.get_mut(key)?.first_scalar_mut()
    }

    pub fn str_value(&self, key: &str) -> Option<&str> {
        self.scalar(key)?.as_str()
    }

    pub fn decimal(&self, key: &str) -> Option<f64> {
        self.scalar(key)?.as_f64()
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        self.scalar(key)?.as_i64()
    }

    pub fn bool_value(&self, key: &str) -> Option<bool> {
        self.scalar(key)?.as_bool()
    }

    /// The nested instance of a single-valued field, or the first element of a sequence.
    pub fn child(&self, key: &str) -> Option<&Instance> {
        self.get(key)?.instances().into_iter().next()
    }

    pub fn child_mut(&mut self, key: &str) -> Option<&mut Instance> {
        self.get_mut(key)?.instances_mut().into_iter().next()
    }

    pub fn children(&self, key: &str) -> Vec<&Instance> {
        self.fields.get(key).map(Value::instances).unwrap_or_default()
    }

    pub fn children_mut(&mut self, key: &str) -> Vec<&mut Instance> {
        self.fields.get_mut(key).map(Value::instances_mut).unwrap_or_default()
    }

    /// Write the selected representation of a union and clear every sibling.
    pub fn set_choice(&mut self, selection: &ChoiceSelection<'_>, value: impl Into<Value>) {
        for sibling in selection.sibling_fields() {
            self.clear(&sibling);
        }
        self.set(selection.field_name(), value);
    }

    /// Suffixes of `group` whose realized field is populated.
    pub fn present_choices<'g>(&self, group: &'g ChoiceGroup) -> Vec<&'g str> {
        group
            .suffixes
            .iter()
            .filter(|s| self.is_present(&group.field_name(s)))
            .map(String::as_str)
            .collect()
    }

    /// Render as JSON, honoring serialization aliases and omitting absent fields.
    pub fn to_json(&self, catalog: &dyn TypeCatalog) -> JsonValue {
        let metas = catalog.fields_of(&self.type_tag).unwrap_or(&[]);
        let mut object = Map::new();
        for (key, value) in &self.fields {
            let name = metas
                .iter()
                .find(|m| &m.key == key)
                .map_or(key.as_str(), |m| m.serialized_name());
            if let Some(rendered) = value.to_json(catalog) {
                object.insert(name.to_string(), rendered);
            }
        }
        JsonValue::Object(object)
    }
}
