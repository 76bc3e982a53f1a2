//! JSON-backed reference catalog.

use super::{CatalogError, TypeCatalog, TypeDefinition, TypeKind, TypeTag};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("builtin_catalog.json");

static BUILTIN: Lazy<InMemoryCatalog> = Lazy::new(|| {
    InMemoryCatalog::from_json_str(BUILTIN_CATALOG).expect("bundled catalog is well-formed")
});

/// On-disk shape of a catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    /// Primitive type tags; declared by name only.
    #[serde(default)]
    pub primitives: Vec<TypeTag>,
    /// `{system -> {code -> display}}`
    #[serde(default)]
    pub displays: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub types: Vec<TypeDefinition>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    types: HashMap<TypeTag, TypeDefinition>,
    order: Vec<TypeTag>,
    displays: HashMap<String, HashMap<String, String>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled FHIR-shaped sample catalog, parsed once per process.
    pub fn builtin() -> &'static InMemoryCatalog {
        &BUILTIN
    }

    pub fn from_document(document: CatalogDocument) -> Result<Self, CatalogError> {
        let mut catalog = InMemoryCatalog::new();
        for name in document.primitives {
            catalog.insert(TypeDefinition::primitive(name))?;
        }
        for definition in document.types {
            catalog.insert(definition)?;
        }
        for (system, codes) in document.displays {
            for (code, display) in codes {
                catalog.add_display(&system, &code, &display);
            }
        }
        Ok(catalog)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Add a type definition. Rejects duplicate tags and choice groups that
    /// realize fields the type does not declare.
    pub fn insert(&mut self, definition: TypeDefinition) -> Result<(), CatalogError> {
        if self.types.contains_key(&definition.tag) {
            return Err(CatalogError::DuplicateType(definition.tag));
        }
        for group in definition.choice_groups() {
            for field in group.realized_fields() {
                if definition.field(&field).is_none() {
                    return Err(CatalogError::DanglingChoice {
                        owner: definition.tag.clone(),
                        group: group.key.clone(),
                        field,
                    });
                }
            }
        }
        self.order.push(definition.tag.clone());
        self.types.insert(definition.tag.clone(), definition);
        Ok(())
    }

    pub fn add_display(&mut self, system: &str, code: &str, display: &str) {
        self.displays
            .entry(system.to_string())
            .or_default()
            .insert(code.to_string(), display.to_string());
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All declared tags in declaration order.
    pub fn tags(&self) -> impl Iterator<Item = &TypeTag> {
        self.order.iter()
    }
}

impl TypeCatalog for InMemoryCatalog {
    fn definition(&self, tag: &TypeTag) -> Option<&TypeDefinition> {
        self.types.get(tag)
    }

    fn resolve_display_name(&self, system: &str, code: &str) -> Option<String> {
        self.displays.get(system)?.get(code).cloned()
    }

    fn resource_types(&self) -> Vec<TypeTag> {
        self.order
            .iter()
            .filter(|tag| self.kind_of(tag) == Some(TypeKind::Resource))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldMeta;

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = InMemoryCatalog::builtin();
        assert!(catalog.len() > 50);
        assert!(catalog.is_primitive_type(&TypeTag::from("decimal")));
        assert!(catalog.is_known_type(&TypeTag::from("Patient.contact")));
        assert_eq!(catalog.kind_of(&TypeTag::from("Range")), Some(TypeKind::Complex));
        assert!(catalog.resource_types().contains(&TypeTag::from("Observation")));
        assert!(!catalog.resource_types().contains(&TypeTag::from("Quantity")));
    }

    #[test]
    fn test_every_builtin_field_type_resolves() {
        let catalog = InMemoryCatalog::builtin();
        for tag in catalog.tags() {
            for field in catalog.fields_of(tag).unwrap_or(&[]) {
                assert!(
                    catalog.is_known_type(&field.type_tag),
                    "{}.{} has undeclared type {}",
                    tag,
                    field.key,
                    field.type_tag
                );
            }
        }
    }

    #[test]
    fn test_builtin_display_lookup() {
        let catalog = InMemoryCatalog::builtin();
        assert_eq!(
            catalog.resolve_display_name("http://loinc.org", "8867-4").as_deref(),
            Some("Heart rate")
        );
        assert_eq!(catalog.resolve_display_name("http://loinc.org", "0000-0"), None);
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut catalog = InMemoryCatalog::new();
        catalog.insert(TypeDefinition::primitive("string")).unwrap();
        let err = catalog.insert(TypeDefinition::primitive("string")).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateType(tag) if tag.as_str() == "string"));
    }

    #[test]
    fn test_dangling_choice_rejected() {
        let mut catalog = InMemoryCatalog::new();
        let definition = TypeDefinition::composite(
            "Thing",
            TypeKind::Complex,
            vec![FieldMeta::new("valueString", "string")],
        )
        .with_choice("value", &["String", "Boolean"]);

        match catalog.insert(definition) {
            Err(CatalogError::DanglingChoice { field, .. }) => assert_eq!(field, "valueBoolean"),
            other => panic!("expected dangling choice error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        assert!(matches!(
            InMemoryCatalog::from_json_str("{\"types\": [{\"name\": \"X\"}]}"),
            Err(CatalogError::Parse(_))
        ));
        assert!(matches!(
            InMemoryCatalog::from_json_str(
                r#"{"types": [{"name": "X", "kind": "complex",
                    "fields": [{"key": "a", "type": "string", "max": "0"}]}]}"#
            ),
            Err(CatalogError::Parse(_))
        ));
    }
}
