//! Invariant Repairer
//!
//! Generation only guarantees that an instance is shaped like its type. The
//! rules in this module enforce the cross-field invariants a field-by-field
//! walk cannot express: ordered bounds, discriminated unions, canonical unit
//! systems, code-system membership and identifier formats.
//!
//! ## Dispatch
//!
//! Rules live in a [`RuleTable`] keyed by [`TypeTag`]. A type without a rule
//! is valid as generated, so a missing entry is the no-op case rather than an
//! error. Repair is applied once, at the root; a rule that needs a nested
//! instance repaired asks for it explicitly through
//! [`RepairContext::repair_nested`] with the statically known nested type.
//!
//! ## Convergence
//!
//! Every rule only rewrites a value when the current one violates the rule,
//! and random regeneration is limited to that case. Running [`Repairer::repair`]
//! twice therefore yields the same instance as running it once.

mod clinical;
mod conformance;
mod datatypes;

use crate::catalog::TypeTag;
use crate::instance::{Instance, Scalar, Value};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use once_cell::sync::Lazy;
use rand::RngCore;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// One type's post-conditions, applied in place.
pub type RepairRule = fn(&mut Instance, &mut RepairContext<'_>) -> Result<(), RepairError>;

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("{type_tag}.{field} must be populated before it can be repaired")]
    MissingField { type_tag: TypeTag, field: String },

    #[error("{type_tag}.{field} has an unexpected shape: {detail}")]
    UnexpectedShape {
        type_tag: TypeTag,
        field: String,
        detail: String,
    },
}

static STANDARD_RULES: Lazy<RuleTable> = Lazy::new(RuleTable::with_standard_rules);

/// Type-keyed dispatch table of repair rules.
#[derive(Clone, Default)]
pub struct RuleTable {
    rules: HashMap<TypeTag, RepairRule>,
}

impl fmt::Debug for RuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.rules.keys().map(TypeTag::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("RuleTable").field("types", &tags).finish()
    }
}

impl RuleTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The shared table of built-in rules, built once per process.
    pub fn standard() -> &'static RuleTable {
        &STANDARD_RULES
    }

    /// A fresh copy of the built-in rules, for callers that register their own on top.
    pub fn with_standard_rules() -> Self {
        let mut table = RuleTable::empty();
        datatypes::register(&mut table);
        clinical::register(&mut table);
        conformance::register(&mut table);
        table
    }

    /// Install `rule` for `tag`, returning the rule it replaces.
    pub fn register(&mut self, tag: impl Into<TypeTag>, rule: RepairRule) -> Option<RepairRule> {
        self.rules.insert(tag.into(), rule)
    }

    pub fn rule_for(&self, tag: &TypeTag) -> Option<RepairRule> {
        self.rules.get(tag).copied()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.rules.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// State threaded through one repair pass.
pub struct RepairContext<'a> {
    rules: &'a RuleTable,
    rng: &'a mut dyn RngCore,
    applied: usize,
}

impl<'a> RepairContext<'a> {
    pub fn new(rules: &'a RuleTable, rng: &'a mut dyn RngCore) -> Self {
        RepairContext {
            rules,
            rng,
            applied: 0,
        }
    }

    pub fn rng(&mut self) -> &mut dyn RngCore {
        &mut *self.rng
    }

    /// Number of rule bodies run so far, nested ones included.
    pub fn rules_applied(&self) -> usize {
        self.applied
    }

    /// Apply the rule registered for `tag` to `instance`, if there is one.
    pub fn repair_nested(&mut self, instance: &mut Instance, tag: &str) -> Result<(), RepairError> {
        let tag = TypeTag::from(tag);
        match self.rules.rule_for(&tag) {
            Some(rule) => {
                log::debug!("applying {} rule", tag);
                self.applied += 1;
                rule(instance, self)
            }
            None => Ok(()),
        }
    }

    /// Repair every nested instance held by `parent.field` (one, or each element of a sequence).
    pub fn repair_children(
        &mut self,
        parent: &mut Instance,
        field: &str,
        tag: &str,
    ) -> Result<(), RepairError> {
        for child in parent.children_mut(field) {
            self.repair_nested(child, tag)?;
        }
        Ok(())
    }

    /// [`repair_children`](Self::repair_children) for several `(field, type)` pairs.
    pub fn repair_fields(
        &mut self,
        parent: &mut Instance,
        fields: &[(&str, &str)],
    ) -> Result<(), RepairError> {
        for (field, tag) in fields {
            self.repair_children(parent, field, tag)?;
        }
        Ok(())
    }
}

/// Applies a [`RuleTable`] to root instances.
#[derive(Debug, Clone, Copy)]
pub struct Repairer<'r> {
    rules: &'r RuleTable,
}

impl Default for Repairer<'static> {
    fn default() -> Self {
        Repairer::new(RuleTable::standard())
    }
}

impl<'r> Repairer<'r> {
    pub fn new(rules: &'r RuleTable) -> Self {
        Repairer { rules }
    }

    /// Repair `instance` in place as an instance of `tag`.
    ///
    /// Returns the number of rule bodies applied. A type with no rule is left
    /// untouched and reports zero.
    pub fn repair(
        &self,
        instance: &mut Instance,
        tag: &TypeTag,
        rng: &mut dyn RngCore,
    ) -> Result<usize, RepairError> {
        let mut ctx = RepairContext::new(self.rules, rng);
        ctx.repair_nested(instance, tag.as_str())?;
        Ok(ctx.rules_applied())
    }
}

// Shared rule helpers.

/// The value of a field the rule cannot work without.
pub(crate) fn require<'i>(instance: &'i Instance, field: &str) -> Result<&'i Value, RepairError> {
    instance.get(field).ok_or_else(|| RepairError::MissingField {
        type_tag: instance.type_tag().clone(),
        field: field.to_string(),
    })
}

pub(crate) fn require_str<'i>(instance: &'i Instance, field: &str) -> Result<&'i str, RepairError> {
    require(instance, field)?
        .first_scalar()
        .and_then(Scalar::as_str)
        .ok_or_else(|| unexpected(instance, field, "expected a textual value"))
}

pub(crate) fn require_bool(instance: &Instance, field: &str) -> Result<bool, RepairError> {
    require(instance, field)?
        .first_scalar()
        .and_then(Scalar::as_bool)
        .ok_or_else(|| unexpected(instance, field, "expected a boolean"))
}

fn unexpected(instance: &Instance, field: &str, detail: &str) -> RepairError {
    RepairError::UnexpectedShape {
        type_tag: instance.type_tag().clone(),
        field: field.to_string(),
        detail: detail.to_string(),
    }
}

pub(crate) fn clear_all(instance: &mut Instance, fields: &[&str]) {
    for field in fields {
        instance.clear(field);
    }
}

/// Keep the first populated field of `fields`; clear the rest.
pub(crate) fn keep_first_present(instance: &mut Instance, fields: &[&str]) {
    let mut seen = false;
    for field in fields {
        if seen {
            instance.clear(field);
        } else if instance.is_present(field) {
            seen = true;
        }
    }
}

/// Parse a date, dateTime or instant. Dates are taken as midnight UTC.
pub(crate) fn parse_temporal(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed);
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let utc = FixedOffset::east_opt(0)?;
    Some(utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

pub(crate) fn compare_temporal(a: &str, b: &str) -> Ordering {
    match (parse_temporal(a), parse_temporal(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Swap two temporal fields when `earlier` is after `later`.
pub(crate) fn order_temporal(instance: &mut Instance, earlier: &str, later: &str) {
    let out_of_order = match (instance.str_value(earlier), instance.str_value(later)) {
        (Some(a), Some(b)) => compare_temporal(a, b) == Ordering::Greater,
        _ => false,
    };
    if out_of_order {
        instance.swap(earlier, later);
    }
}

/// Swap two numeric fields when `low` is greater than `high`.
pub(crate) fn order_numeric(instance: &mut Instance, low: &str, high: &str) {
    if let (Some(a), Some(b)) = (instance.decimal(low), instance.decimal(high)) {
        if a > b {
            instance.swap(low, high);
        }
    }
}

/// Wrap `value` into `[low, high)`. Results that would render with an
/// exponent collapse to `low`.
pub(crate) fn wrap_into(value: f64, low: f64, high: f64) -> f64 {
    let wrapped = low + (value - low).rem_euclid(high - low);
    if crate::primitives::is_canonical_decimal(wrapped) {
        wrapped
    } else {
        low
    }
}

/// Alphanumeric name starting with an uppercase letter.
pub(crate) fn sanitize_name(raw: &str, fallback: &str) -> String {
    let stripped = crate::identifiers::strip_non_alphanumeric(raw);
    let mut chars = stripped.chars();
    match chars.next() {
        None => fallback.to_string(),
        Some(first) if first.is_ascii_uppercase() => stripped,
        Some(first) if first.is_ascii_lowercase() => {
            format!("{}{}", first.to_ascii_uppercase(), chars.as_str())
        }
        Some(_) => format!("{}{}", fallback, stripped),
    }
}

/// Rewrite a textual scalar field in place, keeping its primitive flavor.
pub(crate) fn set_text(instance: &mut Instance, field: &str, text: &str) {
    let replacement = match instance.scalar(field) {
        Some(current) if current.as_str() == Some(text) => return,
        Some(current) => current.with_text(text),
        None => Scalar::String(text.to_string()),
    };
    instance.set(field, replacement);
}
