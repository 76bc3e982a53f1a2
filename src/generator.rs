//! Instance Generator
//!
//! Walks a type's field metadata and assembles a populated [`Instance`],
//! descending into nested composite types under an embedding budget.
//!
//! ## Termination
//!
//! A nested field is admitted when the caller's budget is positive, or when
//! the field is forced (non-zero minimum cardinality, or bound to a value
//! set) and the shared recursion guard is not exhausted. Every descent passes
//! `budget - 1` down, and every descent admitted only because the field is
//! forced consumes one unit of the guard. The guard is initialized once per
//! [`Generator::generate`] call and shared by the whole call tree, so a chain
//! of mutually recursive required fields stops after at most
//! `recursion_guard` forced descents whatever budget the caller passed.
//!
//! ## Unions
//!
//! Each multiple-type group is resolved once, at its first realized field:
//! one member is picked uniformly and every sibling is written as
//! [`Value::Absent`]. The picked member counts as forced. If it is a
//! composite that cannot be admitted, a primitive member is picked instead;
//! if the group has none, the whole group is left absent.

use crate::builders::minimal_coding;
use crate::catalog::{ChoiceGroup, FieldMeta, TypeCatalog, TypeKind, TypeTag};
use crate::codes;
use crate::instance::{ChoiceSelection, Instance, Value};
use crate::primitives::{PrimitiveSynthesizer, PrimitiveTag};
use crate::repair::{RepairError, Repairer, RuleTable};
use crate::shape;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Fields managed by the generator itself rather than the field walk.
pub const EXCLUDED_FIELDS: &[&str] = &[
    "id",
    "meta",
    "implicitRules",
    "contained",
    "extension",
    "modifierExtension",
];

pub const DEFAULT_RECURSION_GUARD: u32 = 6;

/// Coding stamped into the `meta.tag` of every generated resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticTag {
    pub system: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Default for SyntheticTag {
    fn default() -> Self {
        SyntheticTag {
            system: codes::SYNTHETIC_TAG_SYSTEM.to_string(),
            code: codes::SYNTHETIC_TAG_CODE.to_string(),
            display: Some(codes::SYNTHETIC_TAG_DISPLAY.to_string()),
        }
    }
}

/// Configuration for a [`Generator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneratorConfig {
    /// Seed for reproducible runs; `None` draws one from the OS.
    pub seed: Option<u64>,

    /// Maximum number of forced descents past an exhausted budget, per generated root.
    pub recursion_guard: u32,

    pub synthetic_tag: SyntheticTag,

    /// Run the invariant repairer on each generated root.
    pub repair: bool,

    /// Namespace prefix for synthesized URIs.
    pub uri_namespace: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            recursion_guard: DEFAULT_RECURSION_GUARD,
            synthetic_tag: SyntheticTag::default(),
            repair: true,
            uri_namespace: codes::DEFAULT_URI_NAMESPACE.to_string(),
        }
    }
}

impl GeneratorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Default configuration seeded from a label, typically a test name, so
    /// the same label always yields the same instances.
    pub fn seeded_from_label(label: &str) -> Self {
        let digest = Sha256::digest(label.as_bytes());
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        Self::default().with_seed(u64::from_le_bytes(seed))
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Counters for the most recent [`Generator::generate`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationStats {
    /// Nested composites generated.
    pub descents: usize,
    /// Descents admitted only because the field was forced.
    pub forced_descents: usize,
    pub max_depth: usize,
    /// Fields whose type the catalog could not resolve.
    pub skipped_fields: usize,
    /// Unions whose picked composite member was replaced by a primitive one.
    pub choice_fallbacks: usize,
    pub rules_applied: usize,
}

/// A field skipped because the catalog does not know its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub owner: TypeTag,
    pub field: String,
    pub type_tag: TypeTag,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "skipped {}.{}: type {} is not in the catalog",
            self.owner, self.field, self.type_tag
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("type {0} is not declared in the catalog")]
    UnknownType(TypeTag),

    #[error("type {0} is primitive; only composite types can be generated")]
    PrimitiveRoot(TypeTag),

    #[error("repair failed: {0}")]
    Repair(#[from] RepairError),
}

/// Generates instances of catalog types.
///
/// A generator owns its random source and is meant for one thread; run
/// several generators over a shared catalog to generate in parallel.
pub struct Generator<'c> {
    catalog: &'c dyn TypeCatalog,
    rules: &'c RuleTable,
    config: GeneratorConfig,
    rng: ChaCha8Rng,
    primitives: PrimitiveSynthesizer,
    guard: u32,
    depth: usize,
    stats: GenerationStats,
    diagnostics: Vec<Diagnostic>,
}

impl<'c> Generator<'c> {
    pub fn new(catalog: &'c dyn TypeCatalog, config: GeneratorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let primitives = PrimitiveSynthesizer::new(config.uri_namespace.clone());
        Generator {
            catalog,
            rules: RuleTable::standard(),
            guard: config.recursion_guard,
            config,
            rng,
            primitives,
            depth: 0,
            stats: GenerationStats::default(),
            diagnostics: Vec::new(),
        }
    }

    /// Repair with `rules` instead of the standard table.
    pub fn with_rules(mut self, rules: &'c RuleTable) -> Self {
        self.rules = rules;
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn stats(&self) -> &GenerationStats {
        &self.stats
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Generate and, unless disabled, repair one instance of `tag`.
    ///
    /// Fails with [`GenerateError::UnknownType`] when the catalog does not declare `tag`,
    /// and with [`GenerateError::PrimitiveRoot`] when it declares it as a primitive.
    /// A repair rule whose precondition fails surfaces as [`GenerateError::Repair`].
    pub fn generate(&mut self, tag: &TypeTag, budget: i32) -> Result<Instance, GenerateError> {
        let kind = self
            .catalog
            .kind_of(tag)
            .ok_or_else(|| GenerateError::UnknownType(tag.clone()))?;
        if kind == TypeKind::Primitive {
            return Err(GenerateError::PrimitiveRoot(tag.clone()));
        }

        self.guard = self.config.recursion_guard;
        self.depth = 0;
        self.stats = GenerationStats::default();
        self.diagnostics.clear();

        log::debug!("generating {} with budget {}", tag, budget);
        let mut instance = self.build(tag, budget);
        if kind == TypeKind::Resource {
            self.stamp_meta(tag, &mut instance);
        }

        if self.config.repair {
            let applied = Repairer::new(self.rules).repair(&mut instance, tag, &mut self.rng)?;
            self.stats.rules_applied = applied;
        }
        log::debug!(
            "generated {}: {} descents ({} forced), depth {}, {} rules applied",
            tag,
            self.stats.descents,
            self.stats.forced_descents,
            self.stats.max_depth,
            self.stats.rules_applied
        );
        Ok(instance)
    }

    /// One instance of every resource type in the catalog, in declaration order.
    pub fn generate_each(
        &mut self,
        budget: i32,
    ) -> Result<Vec<(TypeTag, Instance)>, GenerateError> {
        self.catalog
            .resource_types()
            .into_iter()
            .map(|tag| {
                let instance = self.generate(&tag, budget)?;
                Ok((tag, instance))
            })
            .collect()
    }

    fn build(&mut self, tag: &TypeTag, budget: i32) -> Instance {
        let catalog = self.catalog;
        let fields = catalog.fields_of(tag).unwrap_or(&[]);
        let groups = catalog.multiple_type_groups_of(tag);
        let mut resolved = vec![false; groups.len()];
        let mut instance = Instance::new(tag.clone());

        for field in fields {
            if EXCLUDED_FIELDS.contains(&field.key.as_str()) {
                instance.set(field.key.clone(), Value::Absent);
                continue;
            }
            if let Some(index) = groups.iter().position(|g| g.contains_field(&field.key)) {
                if !resolved[index] {
                    resolved[index] = true;
                    self.resolve_choice(&mut instance, fields, &groups[index], budget);
                }
                continue;
            }
            let value = self.field_value(tag, field, budget, false);
            instance.set(field.key.clone(), value);
        }
        instance
    }

    fn resolve_choice(
        &mut self,
        instance: &mut Instance,
        fields: &[FieldMeta],
        group: &ChoiceGroup,
        budget: i32,
    ) {
        let members: Vec<(&str, &FieldMeta)> = group
            .suffixes
            .iter()
            .filter_map(|suffix| {
                let name = group.field_name(suffix);
                fields.iter().find(|f| f.key == name).map(|f| (suffix.as_str(), f))
            })
            .collect();
        for (_, meta) in &members {
            instance.set(meta.key.clone(), Value::Absent);
        }
        let Some(&(suffix, meta)) = members.choose(&mut self.rng) else {
            return;
        };

        let owner = instance.type_tag().clone();
        let mut picked = (suffix, self.field_value(&owner, meta, budget, true));
        if !picked.1.is_present() {
            let catalog = self.catalog;
            let primitives: Vec<(&str, &FieldMeta)> = members
                .iter()
                .copied()
                .filter(|(_, f)| catalog.is_primitive_type(&f.type_tag))
                .collect();
            let Some(&(suffix, meta)) = primitives.choose(&mut self.rng) else {
                log::debug!("no admissible member for {}.{}[x]", owner, group.key);
                return;
            };
            self.stats.choice_fallbacks += 1;
            picked = (suffix, self.field_value(&owner, meta, budget, true));
        }

        if let Some(selection) = ChoiceSelection::new(group, picked.0) {
            instance.set_choice(&selection, picked.1);
        }
    }

    fn field_value(
        &mut self,
        owner: &TypeTag,
        field: &FieldMeta,
        budget: i32,
        picked: bool,
    ) -> Value {
        let single = match self.catalog.kind_of(&field.type_tag) {
            None => {
                let diagnostic = Diagnostic {
                    owner: owner.clone(),
                    field: field.key.clone(),
                    type_tag: field.type_tag.clone(),
                };
                log::warn!("{}", diagnostic);
                self.stats.skipped_fields += 1;
                self.diagnostics.push(diagnostic);
                return Value::Absent;
            }
            Some(TypeKind::Primitive) => {
                let tag = PrimitiveTag::from_tag(&field.type_tag).unwrap_or(PrimitiveTag::String);
                let binding = field.binding.as_ref();
                Value::Scalar(self.primitives.synthesize(&mut self.rng, tag, binding))
            }
            Some(_) => match self.descend(field, budget, picked || field.is_forced()) {
                Some(nested) => Value::Composite(nested),
                None => return Value::Absent,
            },
        };
        if field.is_repeating() {
            Value::List(vec![single])
        } else {
            single
        }
    }

    fn descend(&mut self, field: &FieldMeta, budget: i32, forced: bool) -> Option<Instance> {
        if budget <= 0 {
            if !forced || self.guard == 0 {
                return None;
            }
            self.guard -= 1;
            self.stats.forced_descents += 1;
        }
        let next_budget = budget.saturating_sub(1);

        self.stats.descents += 1;
        self.depth += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.depth);
        log::debug!(
            "descending into {} ({}) at depth {} with budget {}",
            field.key,
            field.type_tag,
            self.depth,
            next_budget
        );

        let mut nested = self.build(&field.type_tag, next_budget);
        self.depth -= 1;
        shape::normalize(&mut nested, field, self.catalog, &mut self.rng);
        Some(nested)
    }

    fn stamp_meta(&self, tag: &TypeTag, instance: &mut Instance) {
        let catalog = self.catalog;
        let Some(meta_field) = catalog
            .fields_of(tag)
            .and_then(|fields| fields.iter().find(|f| f.key == "meta"))
        else {
            return;
        };
        let synthetic = &self.config.synthetic_tag;
        let coding =
            minimal_coding(&synthetic.system, &synthetic.code, synthetic.display.as_deref());
        let meta = Instance::new(meta_field.type_tag.clone()).with("tag", vec![coding]);
        instance.set("meta", meta);
    }
}
