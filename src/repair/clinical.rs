// Rules for clinical and administrative resources.

use super::datatypes::align_bounds;
use super::{
    compare_temporal, keep_first_present, order_numeric, order_temporal, require_bool, require_str,
    wrap_into, RepairContext, RepairError, RuleTable,
};
use crate::builders::{first_coding, minimal_codeable_concept, minimal_reference};
use crate::codes;
use crate::instance::{Instance, Scalar};
use chrono::{SecondsFormat, Utc};
use rand::seq::SliceRandom;
use std::cmp::Ordering;

pub(crate) fn register(table: &mut RuleTable) {
    table.register("Patient", patient);
    table.register("Patient.contact", patient_contact);
    table.register("Patient.communication", patient_communication);
    table.register("Observation", observation);
    table.register("Observation.referenceRange", reference_range);
    table.register("Observation.component", observation_component);
    table.register("Condition", condition);
    table.register("AllergyIntolerance", allergy_intolerance);
    table.register("Encounter", encounter);
    table.register("Appointment", appointment);
    table.register("Immunization", immunization);
    table.register("Procedure", procedure);
    table.register("MedicationStatement", medication_statement);
    table.register("MedicationRequest", medication_request);
    table.register("Medication", medication);
    table.register("Goal", goal);
    table.register("CarePlan", care_plan);
    table.register("CarePlan.activity", care_plan_activity);
    table.register("CarePlan.activity.detail", care_plan_activity_detail);
    table.register("RiskAssessment", risk_assessment);
    table.register("RiskAssessment.prediction", risk_prediction);
    table.register("Group", group);
    table.register("Location", location);
    table.register("Organization", organization);
    table.register("Practitioner", practitioner);
    table.register("Specimen", specimen);
    table.register("DiagnosticReport", diagnostic_report);
    table.register("Device", device);
}

const OBSERVATION_VALUES: &[&str] = &[
    "valueQuantity",
    "valueCodeableConcept",
    "valueString",
    "valueBoolean",
    "valueRange",
    "valueRatio",
    "valueSampledData",
    "valueTime",
    "valueDateTime",
    "valuePeriod",
];

const ABATEMENTS: &[&str] = &[
    "abatementDateTime",
    "abatementAge",
    "abatementBoolean",
    "abatementPeriod",
    "abatementRange",
    "abatementString",
];

const CONTACT_DETAILS: &[(&str, &str)] = &[
    ("identifier", "Identifier"),
    ("name", "HumanName"),
    ("telecom", "ContactPoint"),
    ("address", "Address"),
    ("photo", "Attachment"),
];

fn set_code(instance: &mut Instance, field: &str, code: &str) {
    instance.set(field, Scalar::Code(code.to_string()));
}

fn is_language_concept(concept: &Instance) -> bool {
    first_coding(concept).map_or(false, |(system, code)| {
        system == Some(codes::LANGUAGE_SYSTEM) && code == Some(codes::DEFAULT_LANGUAGE)
    })
}

fn language_concept() -> Instance {
    minimal_codeable_concept(
        codes::LANGUAGE_SYSTEM,
        codes::DEFAULT_LANGUAGE,
        Some(codes::DEFAULT_LANGUAGE_DISPLAY),
    )
}

/// Every concept held by `field` names the default language.
fn pin_languages(holder: &mut Instance, field: &str) {
    for concept in holder.children_mut(field) {
        if !is_language_concept(concept) {
            *concept = language_concept();
        }
    }
}

/// Repair `field` as a range of ages: a regular range measured in years.
fn repair_age_range(
    holder: &mut Instance,
    field: &str,
    ctx: &mut RepairContext<'_>,
) -> Result<(), RepairError> {
    ctx.repair_children(holder, field, "Range")?;
    for range in holder.children_mut(field) {
        for bound in ["low", "high"] {
            if let Some(q) = range.child_mut(bound) {
                set_code(q, "code", codes::AGE_UNIT);
                q.set("unit", Scalar::String(codes::AGE_UNIT.to_string()));
            }
        }
    }
    Ok(())
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn patient(p: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    let marital_ok = p
        .child("maritalStatus")
        .and_then(first_coding)
        .map_or(false, |(system, code)| {
            system == Some(codes::MARITAL_STATUS_SYSTEM)
                && code.and_then(codes::marital_status_display).is_some()
        });
    if !marital_ok {
        let (code, display) = codes::MARITAL_STATUS
            .choose(ctx.rng())
            .copied()
            .unwrap_or(("U", "unmarried"));
        p.set(
            "maritalStatus",
            minimal_codeable_concept(codes::MARITAL_STATUS_SYSTEM, code, Some(display)),
        );
    }

    ctx.repair_fields(p, CONTACT_DETAILS)?;
    ctx.repair_fields(
        p,
        &[
            ("contact", "Patient.contact"),
            ("communication", "Patient.communication"),
        ],
    )
}

fn patient_contact(c: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if !c.any_present(&["name", "telecom", "address", "organization"]) {
        c.set("organization", minimal_reference("Some Organization"));
    }
    ctx.repair_fields(
        c,
        &[
            ("name", "HumanName"),
            ("telecom", "ContactPoint"),
            ("address", "Address"),
            ("period", "Period"),
        ],
    )
}

fn patient_communication(
    c: &mut Instance,
    _ctx: &mut RepairContext<'_>,
) -> Result<(), RepairError> {
    if c.is_present("language") {
        pin_languages(c, "language");
    } else {
        c.set("language", language_concept());
    }
    Ok(())
}

/// Shared by observations and their components: a value excludes a data-absent reason.
fn observed_value(o: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if o.any_present(OBSERVATION_VALUES) {
        o.clear("dataAbsentReason");
    }
    ctx.repair_fields(
        o,
        &[
            ("valueQuantity", "Quantity"),
            ("valueRange", "Range"),
            ("valueRatio", "Ratio"),
            ("valueSampledData", "SampledData"),
            ("valuePeriod", "Period"),
            ("referenceRange", "Observation.referenceRange"),
        ],
    )
}

fn observation(o: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    observed_value(o, ctx)?;
    ctx.repair_fields(
        o,
        &[
            ("identifier", "Identifier"),
            ("effectivePeriod", "Period"),
            ("component", "Observation.component"),
        ],
    )
}

fn observation_component(c: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    observed_value(c, ctx)
}

fn reference_range(r: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    ctx.repair_fields(r, &[("low", "SimpleQuantity"), ("high", "SimpleQuantity")])?;
    align_bounds(r);
    repair_age_range(r, "age", ctx)?;
    if !r.any_present(&["low", "high", "text"]) {
        r.set("text", Scalar::String("normal range".to_string()));
    }
    Ok(())
}

fn condition(c: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if c.str_value("verificationStatus") == Some("entered-in-error") {
        c.clear("clinicalStatus");
    } else if c.any_present(ABATEMENTS) {
        let settled = matches!(
            c.str_value("clinicalStatus"),
            Some("resolved") | Some("inactive") | Some("remission")
        );
        if !settled {
            set_code(c, "clinicalStatus", "resolved");
        }
    } else if !c.is_present("clinicalStatus") {
        set_code(c, "clinicalStatus", "active");
    }

    order_temporal(c, "onsetDateTime", "abatementDateTime");
    repair_age_range(c, "onsetRange", ctx)?;
    repair_age_range(c, "abatementRange", ctx)?;
    ctx.repair_fields(
        c,
        &[
            ("identifier", "Identifier"),
            ("onsetAge", "Age"),
            ("onsetPeriod", "Period"),
            ("abatementAge", "Age"),
            ("abatementPeriod", "Period"),
        ],
    )
}

fn allergy_intolerance(a: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if a.str_value("verificationStatus") == Some("entered-in-error") {
        a.clear("clinicalStatus");
    } else if !a.is_present("clinicalStatus") {
        set_code(a, "clinicalStatus", "active");
    }
    repair_age_range(a, "onsetRange", ctx)?;
    ctx.repair_fields(
        a,
        &[
            ("identifier", "Identifier"),
            ("onsetAge", "Age"),
            ("onsetPeriod", "Period"),
        ],
    )
}

fn encounter(e: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    ctx.repair_fields(
        e,
        &[
            ("identifier", "Identifier"),
            ("period", "Period"),
            ("length", "Duration"),
        ],
    )?;
    for backbone in ["statusHistory", "participant", "location"] {
        for entry in e.children_mut(backbone) {
            ctx.repair_children(entry, "period", "Period")?;
        }
    }
    Ok(())
}

fn appointment(a: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    let status = require_str(a, "status")?.to_string();
    let open_ended = status == "proposed" || status == "cancelled";

    match (a.scalar("start").cloned(), a.scalar("end").cloned()) {
        (Some(_), Some(_)) => order_temporal(a, "start", "end"),
        (Some(_), None) | (None, Some(_)) if open_ended => {
            a.clear("start");
            a.clear("end");
        }
        (Some(start), None) => a.set("end", start),
        (None, Some(end)) => a.set("start", end),
        (None, None) if !open_ended => {
            let instant = now();
            a.set("start", Scalar::DateTime(instant.clone()));
            a.set("end", Scalar::DateTime(instant));
        }
        (None, None) => {}
    }

    if status != "cancelled" {
        a.clear("cancelationReason");
    }

    for participant in a.children_mut("participant") {
        if !participant.any_present(&["type", "actor"]) {
            let (code, display) = codes::ATTENDER;
            participant.set(
                "type",
                vec![minimal_codeable_concept(
                    codes::PARTICIPATION_TYPE_SYSTEM,
                    code,
                    Some(display),
                )],
            );
        }
    }
    ctx.repair_fields(a, &[("identifier", "Identifier"), ("requestedPeriod", "Period")])
}

fn immunization(i: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    let not_given = require_bool(i, "notGiven")?;
    if let Some(explanation) = i.child_mut("explanation") {
        explanation.clear(if not_given { "reason" } else { "reasonNotGiven" });
    }
    if not_given {
        i.clear("reaction");
    }
    for protocol in i.children_mut("vaccinationProtocol") {
        order_numeric(protocol, "doseSequence", "seriesDoses");
    }
    ctx.repair_fields(i, &[("identifier", "Identifier"), ("doseQuantity", "SimpleQuantity")])
}

fn procedure(p: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if p.bool_value("notDone") != Some(true) {
        p.clear("notDoneReason");
    }
    ctx.repair_fields(p, &[("identifier", "Identifier"), ("performedPeriod", "Period")])
}

fn medication_statement(m: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if require_str(m, "taken")? != "n" {
        m.clear("reasonNotTaken");
    }
    ctx.repair_fields(
        m,
        &[
            ("identifier", "Identifier"),
            ("effectivePeriod", "Period"),
            ("dosage", "Dosage"),
        ],
    )
}

fn medication_request(m: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    ctx.repair_fields(m, &[("identifier", "Identifier"), ("dosageInstruction", "Dosage")])?;
    for dispense in m.children_mut("dispenseRequest") {
        ctx.repair_fields(
            dispense,
            &[
                ("validityPeriod", "Period"),
                ("quantity", "SimpleQuantity"),
                ("expectedSupplyDuration", "Duration"),
            ],
        )?;
    }
    Ok(())
}

fn medication(m: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    for ingredient in m.children_mut("ingredient") {
        ctx.repair_children(ingredient, "amount", "Ratio")?;
    }
    Ok(())
}

fn goal(g: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    for target in g.children_mut("target") {
        ctx.repair_fields(
            target,
            &[
                ("detailQuantity", "Quantity"),
                ("detailRange", "Range"),
                ("dueDuration", "Duration"),
            ],
        )?;
        let detailed =
            target.any_present(&["detailQuantity", "detailRange", "detailCodeableConcept"]);
        if detailed && !target.is_present("measure") {
            let (code, display) = codes::BODY_WEIGHT;
            target.set(
                "measure",
                minimal_codeable_concept(codes::LOINC_SYSTEM, code, Some(display)),
            );
        }
    }

    if let Some(start) = g.str_value("startDate").map(str::to_string) {
        for target in g.children_mut("target") {
            let overdue = target
                .str_value("dueDate")
                .map_or(false, |due| compare_temporal(&start, due) == Ordering::Greater);
            if overdue {
                target.set("dueDate", Scalar::Date(start.clone()));
            }
        }
    }
    ctx.repair_children(g, "identifier", "Identifier")
}

fn care_plan(c: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    ctx.repair_fields(
        c,
        &[
            ("identifier", "Identifier"),
            ("period", "Period"),
            ("activity", "CarePlan.activity"),
        ],
    )
}

fn care_plan_activity(a: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    keep_first_present(a, &["reference", "detail"]);
    ctx.repair_children(a, "detail", "CarePlan.activity.detail")
}

fn care_plan_activity_detail(
    d: &mut Instance,
    ctx: &mut RepairContext<'_>,
) -> Result<(), RepairError> {
    ctx.repair_fields(
        d,
        &[
            ("scheduledTiming", "Timing"),
            ("scheduledPeriod", "Period"),
            ("quantity", "SimpleQuantity"),
            ("dailyAmount", "SimpleQuantity"),
        ],
    )
}

fn risk_assessment(r: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    ctx.repair_fields(
        r,
        &[
            ("identifier", "Identifier"),
            ("occurrencePeriod", "Period"),
            ("prediction", "RiskAssessment.prediction"),
        ],
    )
}

fn as_percentage(value: f64) -> f64 {
    if (0.0..=100.0).contains(&value) {
        value
    } else {
        wrap_into(value, 0.0, 100.0)
    }
}

fn risk_prediction(p: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if let Some(probability) = p.decimal("probabilityDecimal") {
        let percentage = as_percentage(probability);
        if percentage != probability {
            p.set("probabilityDecimal", Scalar::Decimal(percentage));
        }
    }

    ctx.repair_children(p, "probabilityRange", "Range")?;
    for range in p.children_mut("probabilityRange") {
        for bound in ["low", "high"] {
            if let Some(q) = range.child_mut(bound) {
                set_code(q, "code", codes::PERCENT_UNIT);
                q.set("unit", Scalar::String(codes::PERCENT_UNIT.to_string()));
                if let Some(value) = q.decimal("value") {
                    q.set("value", Scalar::Decimal(as_percentage(value)));
                }
            }
        }
        align_bounds(range);
    }
    ctx.repair_fields(p, &[("whenPeriod", "Period"), ("whenRange", "Range")])
}

fn group(g: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if require_bool(g, "actual")? {
        let members = g.children("member").len();
        if members > 0 {
            g.set("quantity", Scalar::Integer(members as i64));
        }
    } else {
        g.clear("member");
    }

    for characteristic in g.children_mut("characteristic") {
        ctx.repair_fields(
            characteristic,
            &[
                ("valueQuantity", "Quantity"),
                ("valueRange", "Range"),
                ("period", "Period"),
            ],
        )?;
    }
    for member in g.children_mut("member") {
        ctx.repair_children(member, "period", "Period")?;
    }
    ctx.repair_children(g, "identifier", "Identifier")
}

fn location(l: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if let Some(position) = l.child_mut("position") {
        if let Some(latitude) = position.decimal("latitude") {
            if !(-90.0..=90.0).contains(&latitude) {
                position.set("latitude", Scalar::Decimal(wrap_into(latitude, -90.0, 90.0)));
            }
        }
        if let Some(longitude) = position.decimal("longitude") {
            if !(-180.0..=180.0).contains(&longitude) {
                position.set("longitude", Scalar::Decimal(wrap_into(longitude, -180.0, 180.0)));
            }
        }
    }
    ctx.repair_fields(
        l,
        &[
            ("identifier", "Identifier"),
            ("telecom", "ContactPoint"),
            ("address", "Address"),
        ],
    )
}

fn organization(o: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if !o.any_present(&["name", "identifier"]) {
        o.set("name", Scalar::String("Synthetic Organization".to_string()));
    }
    for field in ["address", "telecom"] {
        for entry in o.children_mut(field) {
            if entry.str_value("use") == Some("home") {
                set_code(entry, "use", "work");
            }
        }
    }
    ctx.repair_fields(
        o,
        &[
            ("identifier", "Identifier"),
            ("telecom", "ContactPoint"),
            ("address", "Address"),
        ],
    )?;
    for contact in o.children_mut("contact") {
        ctx.repair_fields(
            contact,
            &[
                ("name", "HumanName"),
                ("telecom", "ContactPoint"),
                ("address", "Address"),
            ],
        )?;
    }
    Ok(())
}

fn practitioner(p: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    pin_languages(p, "communication");
    ctx.repair_fields(p, CONTACT_DETAILS)?;
    for qualification in p.children_mut("qualification") {
        ctx.repair_fields(qualification, &[("identifier", "Identifier"), ("period", "Period")])?;
    }
    Ok(())
}

fn specimen(s: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    ctx.repair_fields(s, &[("identifier", "Identifier"), ("accessionIdentifier", "Identifier")])?;

    if let Some(collection) = s.child_mut("collection") {
        ctx.repair_fields(
            collection,
            &[("collectedPeriod", "Period"), ("quantity", "SimpleQuantity")],
        )?;
    }
    let collected = s
        .child("collection")
        .and_then(|c| c.str_value("collectedDateTime"))
        .map(str::to_string);
    let received_early = match (collected, s.str_value("receivedTime")) {
        (Some(collected), Some(received))
            if compare_temporal(&collected, received) == Ordering::Greater =>
        {
            Some(collected)
        }
        _ => None,
    };
    if let Some(collected) = received_early {
        s.set("receivedTime", Scalar::DateTime(collected));
    }

    for container in s.children_mut("container") {
        ctx.repair_fields(
            container,
            &[("capacity", "SimpleQuantity"), ("specimenQuantity", "SimpleQuantity")],
        )?;
        let capacity = container.child("capacity").cloned();
        if let (Some(capacity), Some(held)) = (capacity, container.child_mut("specimenQuantity")) {
            if let (Some(limit), Some(amount)) =
                (capacity.decimal("value"), held.decimal("value"))
            {
                if amount > limit {
                    held.set("value", Scalar::Decimal(limit));
                }
            }
            for field in ["code", "unit"] {
                if let Some(unit) = capacity.scalar(field) {
                    held.set(field, unit.clone());
                }
            }
        }
    }
    Ok(())
}

fn diagnostic_report(d: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    let issued = d.str_value("issued").map(str::to_string);
    if let Some(issued) = issued {
        let late = d
            .str_value("effectiveDateTime")
            .map_or(false, |effective| compare_temporal(effective, &issued) == Ordering::Greater);
        if late {
            d.set("effectiveDateTime", Scalar::DateTime(issued));
        }
    }
    ctx.repair_fields(
        d,
        &[
            ("identifier", "Identifier"),
            ("effectivePeriod", "Period"),
            ("presentedForm", "Attachment"),
        ],
    )
}

fn device(d: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    order_temporal(d, "manufactureDate", "expirationDate");
    ctx.repair_fields(d, &[("identifier", "Identifier"), ("contact", "ContactPoint")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::minimal_quantity;
    use crate::catalog::TypeTag;
    use crate::instance::Value;
    use crate::repair::Repairer;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn repair(instance: &mut Instance) -> Result<usize, RepairError> {
        let tag = instance.type_tag().clone();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        Repairer::default().repair(instance, &tag, &mut rng)
    }

    #[test]
    fn test_patient_marital_status_replaced_when_foreign() {
        let mut patient = Instance::new("Patient")
            .with("maritalStatus", minimal_codeable_concept("http://example.org", "Z", None));
        repair(&mut patient).unwrap();
        let (system, code) = first_coding(patient.child("maritalStatus").unwrap()).unwrap();
        assert_eq!(system, Some(codes::MARITAL_STATUS_SYSTEM));
        assert!(codes::marital_status_display(code.unwrap()).is_some());
    }

    #[test]
    fn test_patient_marital_status_kept_when_valid() {
        let married = minimal_codeable_concept(codes::MARITAL_STATUS_SYSTEM, "M", Some("Married"));
        let mut patient = Instance::new("Patient").with("maritalStatus", married.clone());
        repair(&mut patient).unwrap();
        assert_eq!(patient.child("maritalStatus"), Some(&married));
    }

    #[test]
    fn test_patient_contact_needs_details() {
        let mut patient = Instance::new("Patient").with(
            "contact",
            vec![Instance::new("Patient.contact").with("name", Value::Absent)],
        );
        repair(&mut patient).unwrap();
        let contact = patient.child("contact").unwrap();
        assert_eq!(
            contact.child("organization").and_then(|o| o.str_value("display")),
            Some("Some Organization")
        );
    }

    #[test]
    fn test_patient_communication_language() {
        let mut patient = Instance::new("Patient").with(
            "communication",
            vec![Instance::new("Patient.communication")
                .with("language", minimal_codeable_concept("urn:other", "xx", None))],
        );
        repair(&mut patient).unwrap();
        let language = patient.child("communication").and_then(|c| c.child("language")).unwrap();
        assert!(is_language_concept(language));
    }

    #[test]
    fn test_observation_value_excludes_absent_reason() {
        let mut observation = Instance::new("Observation")
            .with("valueQuantity", minimal_quantity("Quantity", 72.0, "/min"))
            .with("dataAbsentReason", minimal_codeable_concept("urn:dar", "unknown", None))
            .with(
                "component",
                vec![Instance::new("Observation.component")
                    .with("valueString", Scalar::String("x".into()))
                    .with("dataAbsentReason", minimal_codeable_concept("urn:dar", "error", None))],
            );
        repair(&mut observation).unwrap();
        assert!(!observation.is_present("dataAbsentReason"));
        assert!(!observation.child("component").unwrap().is_present("dataAbsentReason"));
    }

    #[test]
    fn test_reference_range_needs_content() {
        let mut range = Instance::new("Observation.referenceRange")
            .with("low", Value::Absent)
            .with("high", Value::Absent);
        repair(&mut range).unwrap();
        assert_eq!(range.str_value("text"), Some("normal range"));
    }

    #[test]
    fn test_condition_abatement_resolves_status() {
        let mut condition = Instance::new("Condition")
            .with("clinicalStatus", Scalar::Code("active".into()))
            .with("verificationStatus", Scalar::Code("confirmed".into()))
            .with("abatementBoolean", Scalar::Boolean(true));
        repair(&mut condition).unwrap();
        assert_eq!(condition.str_value("clinicalStatus"), Some("resolved"));

        let mut erroneous = Instance::new("Condition")
            .with("clinicalStatus", Scalar::Code("active".into()))
            .with("verificationStatus", Scalar::Code("entered-in-error".into()));
        repair(&mut erroneous).unwrap();
        assert!(!erroneous.is_present("clinicalStatus"));
    }

    #[test]
    fn test_appointment_start_end() {
        let mut booked = Instance::new("Appointment")
            .with("status", Scalar::Code("booked".into()))
            .with("start", Scalar::DateTime("2020-01-01T10:00:00.000Z".into()))
            .with("end", Value::Absent)
            .with("cancelationReason", minimal_codeable_concept("urn:x", "y", None));
        repair(&mut booked).unwrap();
        assert_eq!(booked.str_value("end"), Some("2020-01-01T10:00:00.000Z"));
        assert!(!booked.is_present("cancelationReason"));

        let mut proposed = Instance::new("Appointment")
            .with("status", Scalar::Code("proposed".into()))
            .with("start", Scalar::DateTime("2020-01-01T10:00:00.000Z".into()))
            .with("end", Value::Absent);
        repair(&mut proposed).unwrap();
        assert!(!proposed.is_present("start"));
    }

    #[test]
    fn test_appointment_requires_status() {
        let mut appointment = Instance::new("Appointment");
        assert!(matches!(
            repair(&mut appointment),
            Err(RepairError::MissingField { field, .. }) if field == "status"
        ));
    }

    #[test]
    fn test_immunization_not_given_branches() {
        let explanation = Instance::new("Immunization.explanation")
            .with("reason", vec![minimal_codeable_concept("urn:r", "a", None)])
            .with("reasonNotGiven", vec![minimal_codeable_concept("urn:r", "b", None)]);
        let mut given = Instance::new("Immunization")
            .with("notGiven", Scalar::Boolean(false))
            .with("explanation", explanation.clone());
        repair(&mut given).unwrap();
        let e = given.child("explanation").unwrap();
        assert!(e.is_present("reason") && !e.is_present("reasonNotGiven"));

        let mut withheld = Instance::new("Immunization")
            .with("notGiven", Scalar::Boolean(true))
            .with("explanation", explanation)
            .with("reaction", vec![Instance::new("Immunization.reaction")]);
        repair(&mut withheld).unwrap();
        let e = withheld.child("explanation").unwrap();
        assert!(!e.is_present("reason") && e.is_present("reasonNotGiven"));
        assert!(!withheld.is_present("reaction"));
    }

    #[test]
    fn test_group_membership_follows_actual() {
        let members = vec![Instance::new("Group.member"), Instance::new("Group.member")];
        let mut actual = Instance::new("Group")
            .with("actual", Scalar::Boolean(true))
            .with("quantity", Scalar::Integer(99))
            .with("member", members.clone());
        repair(&mut actual).unwrap();
        assert_eq!(actual.integer("quantity"), Some(2));

        let mut descriptive = Instance::new("Group")
            .with("actual", Scalar::Boolean(false))
            .with("member", members);
        repair(&mut descriptive).unwrap();
        assert!(!descriptive.is_present("member"));
    }

    #[test]
    fn test_risk_probability_is_a_percentage() {
        let mut risk = Instance::new("RiskAssessment").with(
            "prediction",
            vec![Instance::new("RiskAssessment.prediction")
                .with("probabilityDecimal", Scalar::Decimal(250.5))],
        );
        repair(&mut risk).unwrap();
        let p = risk.child("prediction").and_then(|p| p.decimal("probabilityDecimal")).unwrap();
        assert!((0.0..=100.0).contains(&p));
        assert!((p - 50.5).abs() < 1e-9);
    }

    #[test]
    fn test_location_position_wrapped() {
        let mut location = Instance::new("Location").with(
            "position",
            Instance::new("Location.position")
                .with("latitude", Scalar::Decimal(120.0))
                .with("longitude", Scalar::Decimal(45.0)),
        );
        repair(&mut location).unwrap();
        let position = location.child("position").unwrap();
        assert_eq!(position.decimal("latitude"), Some(-60.0));
        assert_eq!(position.decimal("longitude"), Some(45.0));
    }

    #[test]
    fn test_specimen_container_clamped() {
        let mut specimen = Instance::new("Specimen").with(
            "container",
            vec![Instance::new("Specimen.container")
                .with("capacity", minimal_quantity("SimpleQuantity", 5.0, "mL"))
                .with("specimenQuantity", minimal_quantity("SimpleQuantity", 9.0, "L"))],
        );
        repair(&mut specimen).unwrap();
        let held = specimen.child("container").and_then(|c| c.child("specimenQuantity")).unwrap();
        assert_eq!(held.decimal("value"), Some(5.0));
        assert_eq!(held.str_value("code"), Some("mL"));
    }

    #[test]
    fn test_rules_registered_for_resources() {
        let table = RuleTable::standard();
        for tag in ["Encounter", "Goal", "CarePlan.activity", "Device", "DiagnosticReport"] {
            assert!(table.rule_for(&TypeTag::from(tag)).is_some());
        }
    }
}
