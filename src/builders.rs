//! Minimal composite builders shared by the shape rules and repair rules.

use crate::codes;
use crate::instance::{Instance, Scalar, Value};

pub fn minimal_coding(system: &str, code: &str, display: Option<&str>) -> Instance {
    let mut coding = Instance::new("Coding")
        .with("system", Scalar::Uri(system.to_string()))
        .with("code", Scalar::Code(code.to_string()));
    if let Some(display) = display {
        coding.set("display", Scalar::String(display.to_string()));
    }
    coding
}

/// A concept carrying exactly one coding.
pub fn minimal_codeable_concept(system: &str, code: &str, display: Option<&str>) -> Instance {
    Instance::new("CodeableConcept").with("coding", vec![minimal_coding(system, code, display)])
}

/// A UCUM quantity of the given composite type (`Quantity`, `SimpleQuantity`, `Age`, ...).
pub fn minimal_quantity(type_tag: &str, value: f64, unit: &str) -> Instance {
    Instance::new(type_tag)
        .with("value", Scalar::Decimal(value))
        .with("unit", Scalar::String(unit.to_string()))
        .with("system", Scalar::Uri(codes::UCUM_SYSTEM.to_string()))
        .with("code", Scalar::Code(unit.to_string()))
}

pub fn minimal_identifier(system: &str, value: &str) -> Instance {
    Instance::new("Identifier")
        .with("system", Scalar::Uri(system.to_string()))
        .with("value", Scalar::String(value.to_string()))
}

/// A reference that names its target only by display text.
pub fn minimal_reference(display: &str) -> Instance {
    Instance::new("Reference")
        .with("reference", Value::Absent)
        .with("display", Scalar::String(display.to_string()))
}

/// `(system, code)` of the first coding of a concept.
pub fn first_coding(concept: &Instance) -> Option<(Option<&str>, Option<&str>)> {
    let coding = concept.child("coding")?;
    Some((coding.str_value("system"), coding.str_value("code")))
}
