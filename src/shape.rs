//! Shallow shape normalization applied by the generator as each nested
//! composite is produced. These rules look at one composite and the field
//! that holds it; cross-field invariants belong to the repair pass.

use crate::builders::minimal_coding;
use crate::catalog::{FieldMeta, TypeCatalog, TypeTag};
use crate::instance::{Instance, Scalar, Value};
use crate::primitives::{sample_code_table, sample_mime_type};
use rand::seq::SliceRandom;
use rand::Rng;

const ANY_TARGET_DISPLAY: &str = "AnyResource";

pub(crate) fn normalize<R: Rng + ?Sized>(
    instance: &mut Instance,
    field: &FieldMeta,
    catalog: &dyn TypeCatalog,
    rng: &mut R,
) {
    match instance.type_tag().as_str() {
        "CodeableConcept" => coded_concept(instance, field, catalog, rng),
        "Coding" => coding(instance, field, catalog, rng),
        "Reference" => reference(instance, field, rng),
        "Attachment" => attachment(instance, rng),
        _ => {}
    }
}

fn is_repeating(catalog: &dyn TypeCatalog, owner: &TypeTag, key: &str) -> bool {
    catalog
        .fields_of(owner)
        .and_then(|fields| fields.iter().find(|f| f.key == key))
        .map_or(false, FieldMeta::is_repeating)
}

fn coded_concept<R: Rng + ?Sized>(
    concept: &mut Instance,
    field: &FieldMeta,
    catalog: &dyn TypeCatalog,
    rng: &mut R,
) {
    let Some((system, code)) = field.binding.as_ref().and_then(|b| sample_code_table(rng, b)) else {
        return;
    };
    let display = catalog.resolve_display_name(system, code);
    let coding = minimal_coding(system, code, display.as_deref());
    if is_repeating(catalog, concept.type_tag(), "coding") {
        concept.set("coding", vec![coding]);
    } else {
        concept.set("coding", coding);
    }
}

fn coding<R: Rng + ?Sized>(
    coding: &mut Instance,
    field: &FieldMeta,
    catalog: &dyn TypeCatalog,
    rng: &mut R,
) {
    let Some((system, code)) = field.binding.as_ref().and_then(|b| sample_code_table(rng, b)) else {
        return;
    };
    coding.set("system", Scalar::Uri(system.to_string()));
    coding.set("code", Scalar::Code(code.to_string()));
    match catalog.resolve_display_name(system, code) {
        Some(display) => coding.set("display", Scalar::String(display)),
        None => coding.clear("display"),
    }
}

fn reference<R: Rng + ?Sized>(reference: &mut Instance, field: &FieldMeta, rng: &mut R) {
    reference.clear("reference");
    match field.target_types.choose(rng) {
        Some(target) => {
            reference.set("display", Scalar::String(format!("Some {}", target)));
            if reference.has_field("type") {
                reference.set("type", Scalar::Uri(target.to_string()));
            }
        }
        None => reference.set("display", Scalar::String(ANY_TARGET_DISPLAY.to_string())),
    }
}

fn attachment<R: Rng + ?Sized>(attachment: &mut Instance, rng: &mut R) {
    attachment.set("contentType", Scalar::Code(sample_mime_type(rng).to_string()));
    if attachment.has_field("data") {
        attachment.set("data", Value::Absent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Binding, InMemoryCatalog};
    use crate::codes;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn loinc_binding() -> Binding {
        Binding::to_value_set("http://hl7.org/fhir/ValueSet/observation-codes")
            .with_codes(codes::LOINC_SYSTEM, &["8867-4"])
    }

    #[test]
    fn test_bound_concept_gets_table_coding_with_display() {
        let catalog = InMemoryCatalog::builtin();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let field = FieldMeta::new("code", "CodeableConcept").bound(loinc_binding());
        let mut concept = Instance::new("CodeableConcept").with("text", Scalar::String("x".into()));

        normalize(&mut concept, &field, catalog, &mut rng);

        let coding = concept.get("coding").unwrap();
        assert!(coding.is_list());
        let coding = concept.child("coding").unwrap();
        assert_eq!(coding.str_value("system"), Some(codes::LOINC_SYSTEM));
        assert_eq!(coding.str_value("code"), Some("8867-4"));
        assert_eq!(coding.str_value("display"), Some("Heart rate"));
    }

    #[test]
    fn test_unbound_concept_is_left_alone() {
        let catalog = InMemoryCatalog::builtin();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let field = FieldMeta::new("code", "CodeableConcept");
        let mut concept = Instance::new("CodeableConcept").with("text", Scalar::String("x".into()));
        let before = concept.clone();
        normalize(&mut concept, &field, catalog, &mut rng);
        assert_eq!(concept, before);
    }

    #[test]
    fn test_reference_display_names_target() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let field = FieldMeta::new("subject", "Reference").targets(&["Patient"]);
        let mut reference = Instance::new("Reference")
            .with("reference", Scalar::String("Patient/1".into()))
            .with("type", Value::Absent);
        reference_for_test(&mut reference, &field, &mut rng);
        assert!(!reference.is_present("reference"));
        assert_eq!(reference.str_value("display"), Some("Some Patient"));
        assert_eq!(reference.str_value("type"), Some("Patient"));

        let mut untyped = Instance::new("Reference").with("reference", Scalar::String("x".into()));
        reference_for_test(&mut untyped, &FieldMeta::new("focus", "Reference"), &mut rng);
        assert_eq!(untyped.str_value("display"), Some(ANY_TARGET_DISPLAY));
        assert!(!untyped.has_field("type"));
    }

    fn reference_for_test(instance: &mut Instance, field: &FieldMeta, rng: &mut ChaCha8Rng) {
        normalize(instance, field, InMemoryCatalog::builtin(), rng);
    }

    #[test]
    fn test_attachment_has_content_type_and_no_payload() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut attachment =
            Instance::new("Attachment").with("data", Scalar::Binary("AAAA".into()));
        normalize(
            &mut attachment,
            &FieldMeta::new("photo", "Attachment"),
            InMemoryCatalog::builtin(),
            &mut rng,
        );
        assert!(codes::is_mime_type(attachment.str_value("contentType").unwrap()));
        assert!(!attachment.is_present("data"));
    }
}
