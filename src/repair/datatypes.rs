// Rules for general-purpose data types. Resource rules reach these through
// `RepairContext::repair_nested`; none of them is applied automatically.

use super::{order_numeric, order_temporal, RepairContext, RepairError, RuleTable};
use crate::codes;
use crate::identifiers::{is_hierarchical_id, next_hierarchical_id_with};
use crate::instance::{Instance, Scalar};
use crate::primitives::sample_mime_type;

pub(crate) fn register(table: &mut RuleTable) {
    table.register("Quantity", quantity);
    table.register("SimpleQuantity", quantity);
    table.register("Age", age);
    table.register("Duration", duration);
    table.register("Range", range);
    table.register("Period", period);
    table.register("Ratio", ratio);
    table.register("SampledData", sampled_data);
    table.register("HumanName", with_period);
    table.register("Address", with_period);
    table.register("ContactPoint", contact_point);
    table.register("Identifier", identifier);
    table.register("Attachment", attachment);
    table.register("Timing", timing);
    table.register("Timing.repeat", timing_repeat);
    table.register("Dosage", dosage);
}

/// Pin a quantity to UCUM. `code` and `unit` become the current code when
/// `accept` allows it, `fallback` otherwise. Comparators are dropped.
fn pin_units(q: &mut Instance, accept: fn(&str) -> bool, fallback: &str) {
    q.clear("comparator");
    let unit = q
        .str_value("code")
        .filter(|code| accept(code))
        .unwrap_or(fallback)
        .to_string();
    q.set("system", Scalar::Uri(codes::UCUM_SYSTEM.to_string()));
    q.set("code", Scalar::Code(unit.clone()));
    q.set("unit", Scalar::String(unit));
}

fn quantity(q: &mut Instance, _ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    pin_units(q, codes::is_ucum_unit, codes::DEFAULT_UNIT);
    Ok(())
}

fn age(q: &mut Instance, _ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    pin_units(q, |code| code == codes::AGE_UNIT, codes::AGE_UNIT);
    Ok(())
}

fn duration(q: &mut Instance, _ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    pin_units(q, codes::is_time_unit, codes::DEFAULT_TIME_UNIT);
    Ok(())
}

/// Give `high` the unit of `low`, then order the pair by value.
pub(crate) fn align_bounds(range: &mut Instance) {
    let low_unit = range
        .child("low")
        .map(|low| (low.scalar("code").cloned(), low.scalar("unit").cloned()));
    if let (Some((code, unit)), Some(high)) = (low_unit, range.child_mut("high")) {
        if let Some(code) = code {
            high.set("code", code);
        }
        if let Some(unit) = unit {
            high.set("unit", unit);
        }
    }

    let values = (
        range.child("low").and_then(|q| q.decimal("value")),
        range.child("high").and_then(|q| q.decimal("value")),
    );
    if let (Some(low), Some(high)) = values {
        if low > high {
            range.swap("low", "high");
        }
    }
}

fn range(r: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    ctx.repair_fields(r, &[("low", "SimpleQuantity"), ("high", "SimpleQuantity")])?;
    align_bounds(r);
    Ok(())
}

fn period(p: &mut Instance, _ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    order_temporal(p, "start", "end");
    Ok(())
}

fn ratio(r: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    ctx.repair_fields(r, &[("numerator", "Quantity"), ("denominator", "Quantity")])?;
    if let Some(denominator) = r.child_mut("denominator") {
        if denominator.decimal("value") == Some(0.0) {
            denominator.set("value", Scalar::Decimal(1.0));
        }
    }
    Ok(())
}

fn sampled_data(s: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    ctx.repair_children(s, "origin", "SimpleQuantity")?;
    order_numeric(s, "lowerLimit", "upperLimit");
    Ok(())
}

fn with_period(instance: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    ctx.repair_children(instance, "period", "Period")
}

fn contact_point(c: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if c.is_present("value") && !c.is_present("system") {
        c.set("system", Scalar::Code("other".to_string()));
    }
    ctx.repair_children(c, "period", "Period")
}

fn identifier(i: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    let uri_system = i.str_value("system") == Some(codes::URI_IDENTIFIER_SYSTEM);
    let valid = i.str_value("value").map_or(false, is_hierarchical_id);
    if uri_system && !valid {
        let value = next_hierarchical_id_with(ctx.rng());
        i.set("value", Scalar::String(value));
    }
    ctx.repair_children(i, "period", "Period")
}

fn attachment(a: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if a.is_present("data") && !a.is_present("contentType") {
        let mime = sample_mime_type(ctx.rng());
        a.set("contentType", Scalar::Code(mime.to_string()));
    }
    Ok(())
}

fn timing(t: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    ctx.repair_children(t, "repeat", "Timing.repeat")
}

/// Pair a measured amount with a unit of time, or drop its upper bound when
/// there is no amount to bound.
fn pin_time_unit(repeat: &mut Instance, amount: &str, max: &str, unit: &str) {
    if !repeat.is_present(amount) {
        repeat.clear(max);
        return;
    }
    let valid = repeat.str_value(unit).map_or(false, codes::is_time_unit);
    if !valid {
        repeat.set(unit, Scalar::Code(codes::DEFAULT_TIME_UNIT.to_string()));
    }
}

fn timing_repeat(r: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    pin_time_unit(r, "duration", "durationMax", "durationUnit");
    pin_time_unit(r, "period", "periodMax", "periodUnit");
    order_numeric(r, "count", "countMax");
    order_numeric(r, "duration", "durationMax");
    order_numeric(r, "frequency", "frequencyMax");
    order_numeric(r, "period", "periodMax");
    if r.is_present("offset") && !r.is_present("when") {
        r.clear("offset");
    }
    ctx.repair_fields(
        r,
        &[
            ("boundsDuration", "Duration"),
            ("boundsRange", "Range"),
            ("boundsPeriod", "Period"),
        ],
    )
}

fn dosage(d: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    ctx.repair_fields(
        d,
        &[
            ("timing", "Timing"),
            ("doseRange", "Range"),
            ("doseQuantity", "SimpleQuantity"),
            ("maxDosePerPeriod", "Ratio"),
            ("maxDosePerAdministration", "SimpleQuantity"),
            ("rateRatio", "Ratio"),
            ("rateRange", "Range"),
            ("rateQuantity", "SimpleQuantity"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{minimal_identifier, minimal_quantity};
    use crate::catalog::TypeTag;
    use crate::instance::Value;
    use crate::repair::Repairer;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn repair(instance: &mut Instance) {
        let tag = instance.type_tag().clone();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        Repairer::default().repair(instance, &tag, &mut rng).unwrap();
    }

    #[test]
    fn test_quantity_pins_ucum_and_drops_comparator() {
        let mut q = minimal_quantity("Quantity", 2.0, "furlong")
            .with("comparator", Scalar::Code("<".into()));
        repair(&mut q);
        assert_eq!(q.raw("comparator"), Some(&Value::Absent));
        assert_eq!(q.str_value("system"), Some(codes::UCUM_SYSTEM));
        assert_eq!(q.str_value("code"), Some(codes::DEFAULT_UNIT));
        assert_eq!(q.str_value("unit"), Some(codes::DEFAULT_UNIT));

        let mut kg = minimal_quantity("SimpleQuantity", 2.0, "kg");
        repair(&mut kg);
        assert_eq!(kg.str_value("code"), Some("kg"));
    }

    #[test]
    fn test_age_and_duration_units() {
        let mut age = minimal_quantity("Age", 40.0, "mg");
        repair(&mut age);
        assert_eq!(age.str_value("code"), Some("a"));

        let mut minutes = minimal_quantity("Duration", 5.0, "min");
        repair(&mut minutes);
        assert_eq!(minutes.str_value("code"), Some("min"));

        let mut bogus = minimal_quantity("Duration", 5.0, "kg");
        repair(&mut bogus);
        assert_eq!(bogus.str_value("code"), Some(codes::DEFAULT_TIME_UNIT));
    }

    #[test]
    fn test_range_bounds_are_swapped() {
        let mut range = Instance::new("Range")
            .with("low", minimal_quantity("SimpleQuantity", 50.0, "kg"))
            .with("high", minimal_quantity("SimpleQuantity", 10.0, "g"));
        repair(&mut range);
        assert_eq!(range.child("low").and_then(|q| q.decimal("value")), Some(10.0));
        assert_eq!(range.child("high").and_then(|q| q.decimal("value")), Some(50.0));
        assert_eq!(range.child("low").and_then(|q| q.str_value("code")), Some("kg"));
        assert_eq!(range.child("high").and_then(|q| q.str_value("code")), Some("kg"));
    }

    #[test]
    fn test_period_is_ordered() {
        let mut period = Instance::new("Period")
            .with("start", Scalar::DateTime("2021-06-01T00:00:00Z".into()))
            .with("end", Scalar::DateTime("2020-06-01T00:00:00Z".into()));
        repair(&mut period);
        assert_eq!(period.str_value("start"), Some("2020-06-01T00:00:00Z"));
        assert_eq!(period.str_value("end"), Some("2021-06-01T00:00:00Z"));
    }

    #[test]
    fn test_ratio_denominator_is_never_zero() {
        let mut ratio = Instance::new("Ratio")
            .with("numerator", minimal_quantity("Quantity", 3.0, "mg"))
            .with("denominator", minimal_quantity("Quantity", 0.0, "mL"));
        repair(&mut ratio);
        assert_eq!(ratio.child("denominator").and_then(|q| q.decimal("value")), Some(1.0));
    }

    #[test]
    fn test_uri_identifier_gets_hierarchical_value() {
        let mut identifier = minimal_identifier(codes::URI_IDENTIFIER_SYSTEM, "not a uri");
        repair(&mut identifier);
        let value = identifier.str_value("value").unwrap().to_string();
        assert!(is_hierarchical_id(&value));

        repair(&mut identifier);
        assert_eq!(identifier.str_value("value"), Some(value.as_str()));
    }

    #[test]
    fn test_timing_repeat_units_and_bounds() {
        let mut repeat = Instance::new("Timing.repeat")
            .with("duration", Scalar::Decimal(4.0))
            .with("durationMax", Scalar::Decimal(2.0))
            .with("durationUnit", Scalar::Code("kg".into()))
            .with("period", Value::Absent)
            .with("periodMax", Scalar::Decimal(9.0))
            .with("count", Scalar::Integer(7))
            .with("countMax", Scalar::Integer(3))
            .with("offset", Scalar::Integer(30))
            .with("when", Value::Absent);
        let mut timing = Instance::new("Timing").with("repeat", repeat.clone());
        repair(&mut timing);
        repeat = timing.child("repeat").unwrap().clone();

        assert_eq!(repeat.str_value("durationUnit"), Some(codes::DEFAULT_TIME_UNIT));
        assert_eq!(repeat.decimal("duration"), Some(2.0));
        assert_eq!(repeat.decimal("durationMax"), Some(4.0));
        assert!(!repeat.is_present("periodMax"));
        assert_eq!(repeat.integer("count"), Some(3));
        assert_eq!(repeat.integer("countMax"), Some(7));
        assert!(!repeat.is_present("offset"));
    }

    #[test]
    fn test_contact_point_needs_system_with_value() {
        let mut contact = Instance::new("ContactPoint")
            .with("value", Scalar::String("555-0100".into()))
            .with("system", Value::Absent);
        repair(&mut contact);
        assert_eq!(contact.str_value("system"), Some("other"));
    }

    #[test]
    fn test_attachment_with_data_gets_content_type() {
        let mut attachment = Instance::new("Attachment")
            .with("data", Scalar::Binary("aGVsbG8=".into()))
            .with("contentType", Value::Absent);
        repair(&mut attachment);
        assert!(codes::is_mime_type(attachment.str_value("contentType").unwrap()));
    }

    #[test]
    fn test_unknown_tag_is_not_registered() {
        assert!(RuleTable::standard().rule_for(&TypeTag::from("Annotation")).is_none());
    }
}
