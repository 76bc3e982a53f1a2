//! # Repair Test Suite
//!
//! Exercises the standard rule table through the public API: the crate-level
//! `repair` entry point, precondition failures, convergence, and the
//! invariants repair guarantees on generated instances.

use instance_synth::builders::{minimal_codeable_concept, minimal_quantity};
use instance_synth::{
    codes, repair, Generator, GeneratorConfig, InMemoryCatalog, Instance, RepairContext,
    RepairError, Repairer, RuleTable, Scalar, TypeTag,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn range(low: f64, high: f64) -> Instance {
    Instance::new("Range")
        .with("low", minimal_quantity("SimpleQuantity", low, "mg"))
        .with("high", minimal_quantity("SimpleQuantity", high, "mg"))
}

#[test]
fn test_inverted_range_is_swapped() {
    let mut r = range(50.0, 10.0);
    repair(&mut r, "Range").unwrap();

    assert_eq!(r.child("low").and_then(|q| q.decimal("value")), Some(10.0));
    assert_eq!(r.child("high").and_then(|q| q.decimal("value")), Some(50.0));
}

#[test]
fn test_range_high_takes_low_unit() {
    let mut r = Instance::new("Range")
        .with("low", minimal_quantity("SimpleQuantity", 1.0, "kg"))
        .with("high", minimal_quantity("SimpleQuantity", 2.0, "g"));
    repair(&mut r, "Range").unwrap();

    let high = r.child("high").unwrap();
    assert_eq!(high.str_value("code"), Some("kg"));
    assert_eq!(high.str_value("unit"), Some("kg"));
}

#[test]
fn test_immunization_requires_not_given() {
    let mut immunization =
        Instance::new("Immunization").with("status", Scalar::Code("completed".into()));
    match repair(&mut immunization, "Immunization") {
        Err(RepairError::MissingField { type_tag, field }) => {
            assert_eq!(type_tag.as_str(), "Immunization");
            assert_eq!(field, "notGiven");
        }
        other => panic!("expected a missing field error, got {:?}", other),
    }
}

#[test]
fn test_not_given_immunization_drops_reactions() {
    let mut immunization = Instance::new("Immunization")
        .with("notGiven", Scalar::Boolean(true))
        .with("reaction", vec![Instance::new("Immunization.reaction")]);
    repair(&mut immunization, "Immunization").unwrap();
    assert!(!immunization.is_present("reaction"));
}

#[test]
fn test_invalid_marital_status_is_replaced() {
    let mut patient = Instance::new("Patient").with(
        "maritalStatus",
        minimal_codeable_concept("http://example.org/other", "XYZ", None),
    );
    repair(&mut patient, "Patient").unwrap();

    let coding = patient.child("maritalStatus").and_then(|c| c.child("coding")).unwrap();
    assert_eq!(coding.str_value("system"), Some(codes::MARITAL_STATUS_SYSTEM));
    assert!(codes::marital_status_display(coding.str_value("code").unwrap()).is_some());
}

#[test]
fn test_untyped_instance_is_untouched() {
    let mut unknown = Instance::new("Unlisted").with("value", Scalar::Integer(3));
    let before = unknown.clone();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let applied = Repairer::default()
        .repair(&mut unknown, &TypeTag::from("Unlisted"), &mut rng)
        .unwrap();
    assert_eq!(applied, 0);
    assert_eq!(unknown, before);
}

#[test]
fn test_repair_is_idempotent_on_generated_resources() {
    let catalog = InMemoryCatalog::builtin();
    let mut generator = Generator::new(
        catalog,
        GeneratorConfig::seeded_from_label("test_repair_is_idempotent_on_generated_resources"),
    );
    let mut rng = ChaCha8Rng::seed_from_u64(17);

    for budget in [0, 2] {
        for (tag, instance) in generator.generate_each(budget).unwrap() {
            let mut again = instance.clone();
            Repairer::default().repair(&mut again, &tag, &mut rng).unwrap();
            assert_eq!(again, instance, "second repair of {} changed it", tag);
        }
    }
}

#[test]
fn test_generated_ranges_are_ordered() {
    let catalog = InMemoryCatalog::builtin();
    for seed in 0..64u64 {
        let mut generator = Generator::new(catalog, GeneratorConfig::default().with_seed(seed));
        let r = generator.generate(&TypeTag::from("Range"), 1).unwrap();
        let low = r.child("low").and_then(|q| q.decimal("value"));
        let high = r.child("high").and_then(|q| q.decimal("value"));
        if let (Some(low), Some(high)) = (low, high) {
            assert!(low <= high, "seed {}: {} > {}", seed, low, high);
        }
    }
}

#[test]
fn test_custom_rule_replaces_standard_rule() {
    fn fixed_range(r: &mut Instance, _ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
        r.clear("high");
        Ok(())
    }

    let mut rules = RuleTable::with_standard_rules();
    assert!(rules.register("Range", fixed_range).is_some());

    let mut r = range(50.0, 10.0);
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    Repairer::new(&rules).repair(&mut r, &TypeTag::from("Range"), &mut rng).unwrap();
    assert!(!r.is_present("high"));
    assert_eq!(r.child("low").and_then(|q| q.decimal("value")), Some(50.0));
}
