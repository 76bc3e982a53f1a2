//! # Instance Synth
//!
//! Synthetic instance generation and invariant repair for recursively typed
//! schema catalogs.
//!
//! Every instance is generated from catalog metadata alone, bounded by an
//! embedding budget plus a shared recursion guard, then passed once through a
//! type-keyed table of repair rules that enforce the semantic invariants a
//! field-by-field walk cannot express.

pub mod builders;
pub mod catalog;
pub mod codes;
pub mod generator;
pub mod identifiers;
pub mod instance;
pub mod primitives;
pub mod repair;
mod shape;

// Re-export core types for easy access
pub use catalog::{
    Binding, Cardinality, CatalogDocument, CatalogError, ChoiceGroup, FieldMeta, InMemoryCatalog,
    TypeCatalog, TypeDefinition, TypeKind, TypeTag,
};
pub use generator::{
    Diagnostic, GenerateError, GenerationStats, Generator, GeneratorConfig, SyntheticTag,
};
pub use identifiers::{is_hierarchical_id, next_hierarchical_id_with};
pub use instance::{ChoiceSelection, Instance, Scalar, Value};
pub use primitives::{is_canonical_decimal, PrimitiveSynthesizer, PrimitiveTag};
pub use repair::{RepairContext, RepairError, RepairRule, Repairer, RuleTable};

/// Generate one repaired instance of `type_tag` with an entropy-seeded generator.
///
/// Errors are those of [`Generator::generate`].
pub fn generate(
    catalog: &dyn TypeCatalog,
    type_tag: impl Into<TypeTag>,
    budget: i32,
) -> Result<Instance, GenerateError> {
    Generator::new(catalog, GeneratorConfig::default()).generate(&type_tag.into(), budget)
}

/// Re-run the standard repair rules on `instance`, e.g. after editing a generated value.
pub fn repair(instance: &mut Instance, type_tag: impl Into<TypeTag>) -> Result<(), RepairError> {
    let mut rng = rand::thread_rng();
    Repairer::default().repair(instance, &type_tag.into(), &mut rng)?;
    Ok(())
}

/// A standalone hierarchical identifier (`urn:oid:1.2.<n>...`).
pub fn next_hierarchical_id() -> String {
    next_hierarchical_id_with(&mut rand::thread_rng())
}
