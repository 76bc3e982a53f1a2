// Rules for conformance and terminology resources. Most of them are about
// names and identifiers that other artifacts refer to, so they sanitize and
// deduplicate rather than reorder.

use super::{clear_all, require_str, sanitize_name, set_text, RepairContext, RepairError, RuleTable};
use crate::codes;
use crate::identifiers::{is_hierarchical_id, next_hierarchical_id_with, strip_non_alphanumeric};
use crate::instance::{Instance, Scalar, Value};
use std::collections::HashSet;

const NAME_FALLBACK: &str = "Synthetic";
const BASE_DEFINITION_ROOT: &str = "http://hl7.org/fhir/StructureDefinition/";
const DEFAULT_PAYLOAD: &str = "application/fhir+json";
/// Initial-value representations and the question type each one implies.
const ITEM_INITIALS: &[(&str, &str)] = &[
    ("initialBoolean", "boolean"),
    ("initialDecimal", "decimal"),
    ("initialInteger", "integer"),
    ("initialString", "string"),
    ("initialCoding", "choice"),
];

pub(crate) fn register(table: &mut RuleTable) {
    table.register("NamingSystem", naming_system);
    table.register("StructureDefinition", structure_definition);
    table.register("ValueSet", value_set);
    table.register("CodeSystem", code_system);
    table.register("Questionnaire", questionnaire);
    table.register("Questionnaire.item", questionnaire_item);
    table.register("SearchParameter", search_parameter);
    table.register("Subscription", subscription);
}

fn set_code(instance: &mut Instance, field: &str, code: &str) {
    instance.set(field, Scalar::Code(code.to_string()));
}

/// Rewrite `field` as a computable name, if it is populated.
fn sanitize_field(instance: &mut Instance, field: &str) {
    if let Some(raw) = instance.str_value(field) {
        let clean = sanitize_name(raw, NAME_FALLBACK);
        set_text(instance, field, &clean);
    }
}

fn naming_system(n: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    sanitize_field(n, "name");
    let root = n.str_value("kind") == Some("root");
    let mut preferred: HashSet<String> = HashSet::new();

    for unique in n.children_mut("uniqueId") {
        let mut kind = require_str(unique, "type")?.to_string();
        if root && kind == "uuid" {
            kind = "oid".to_string();
            set_code(unique, "type", &kind);
        }
        if kind == "oid" && !unique.str_value("value").map_or(false, is_hierarchical_id) {
            let value = next_hierarchical_id_with(ctx.rng());
            unique.set("value", Scalar::String(value));
        }
        if unique.bool_value("preferred") == Some(true) && !preferred.insert(kind) {
            unique.set("preferred", Scalar::Boolean(false));
        }
        ctx.repair_children(unique, "period", "Period")?;
    }

    if n.str_value("status") != Some("retired") {
        n.clear("replacedBy");
    }
    Ok(())
}

fn structure_definition(s: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    sanitize_field(s, "name");

    let defined_type = s.str_value("type").map(str::to_string);
    if defined_type.as_deref() == Some("Extension") {
        if !s.is_present("context") {
            s.set("context", vec![Value::Scalar(Scalar::String("Patient".to_string()))]);
        }
        if !s.is_present("contextType") {
            set_code(s, "contextType", "resource");
        }
    } else {
        clear_all(s, &["context", "contextType"]);
    }

    let needs_base = s.is_present("derivation") || s.bool_value("abstract") == Some(false);
    if needs_base && !s.is_present("baseDefinition") {
        let base = format!(
            "{}{}",
            BASE_DEFINITION_ROOT,
            defined_type.as_deref().unwrap_or("DomainResource")
        );
        s.set("baseDefinition", Scalar::Uri(base));
    }
    if s.is_present("baseDefinition") && !s.is_present("derivation") {
        set_code(s, "derivation", "constraint");
    }
    ctx.repair_children(s, "identifier", "Identifier")
}

fn value_set(v: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    sanitize_field(v, "name");
    for compose in v.children_mut("compose") {
        for include in compose.children_mut("include") {
            let needs_system = include.is_present("concept") || !include.is_present("valueSet");
            if needs_system && !include.is_present("system") {
                let system = format!("{}CodeSystem", codes::DEFAULT_URI_NAMESPACE);
                include.set("system", Scalar::Uri(system));
            }
        }
    }
    ctx.repair_children(v, "identifier", "Identifier")
}

/// Suffix every repeated code in a concept hierarchy until all codes are
/// unique. Returns how many concepts the hierarchy holds.
fn dedupe_codes(holder: &mut Instance, seen: &mut HashSet<String>) -> usize {
    let mut total = 0;
    for concept in holder.children_mut("concept") {
        total += 1;
        if let Some(code) = concept.str_value("code").map(str::to_string) {
            if !seen.insert(code.clone()) {
                let mut n = 2;
                let unique = loop {
                    let candidate = format!("{}-{}", code, n);
                    if seen.insert(candidate.clone()) {
                        break candidate;
                    }
                    n += 1;
                };
                set_text(concept, "code", &unique);
            }
        }
        total += dedupe_codes(concept, seen);
    }
    total
}

fn code_system(c: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    sanitize_field(c, "name");
    let total = dedupe_codes(c, &mut HashSet::new());
    if c.str_value("content") == Some("complete") && c.integer("count") != Some(total as i64) {
        c.set("count", Scalar::Integer(total as i64));
    }
    ctx.repair_children(c, "identifier", "Identifier")
}

fn questionnaire(q: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    sanitize_field(q, "name");
    ctx.repair_fields(q, &[("identifier", "Identifier"), ("item", "Questionnaire.item")])
}

fn questionnaire_item(item: &mut Instance, ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    let link_id = require_str(item, "linkId")?;
    let clean = strip_non_alphanumeric(link_id);
    let clean = if clean.is_empty() { "item".to_string() } else { clean };
    if clean != link_id {
        set_text(item, "linkId", &clean);
    }

    let mut kind = require_str(item, "type")?.to_string();
    if kind == "group" && !item.is_present("item") {
        kind = "string".to_string();
        set_code(item, "type", &kind);
    }
    if kind == "group" || kind == "display" {
        // Only questions carry an initial answer.
        let implied = ITEM_INITIALS
            .iter()
            .find(|(field, _)| item.is_present(field))
            .map(|(_, question)| *question);
        if let Some(question) = implied {
            kind = question.to_string();
            set_code(item, "type", &kind);
        }
    }
    if kind == "display" {
        clear_all(item, &["required", "repeats", "readOnly", "item"]);
    }
    if kind != "choice" && kind != "open-choice" {
        clear_all(item, &["options", "option"]);
    }
    if !matches!(kind.as_str(), "string" | "text" | "url") {
        item.clear("maxLength");
    }
    ctx.repair_children(item, "item", "Questionnaire.item")
}

fn search_parameter(s: &mut Instance, _ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    sanitize_field(s, "name");
    let code = require_str(s, "code")?;
    let clean = strip_non_alphanumeric(code);
    let clean = if clean.is_empty() { "code".to_string() } else { clean };
    if clean != code {
        set_text(s, "code", &clean);
    }

    if s.is_present("xpath") && !s.is_present("xpathUsage") {
        set_code(s, "xpathUsage", "normal");
    }
    let kind = require_str(s, "type")?.to_string();
    if kind != "reference" {
        s.clear("target");
    }
    if kind != "composite" {
        s.clear("component");
    }
    Ok(())
}

fn subscription(s: &mut Instance, _ctx: &mut RepairContext<'_>) -> Result<(), RepairError> {
    if s.str_value("status") != Some("error") {
        s.clear("error");
    }
    for channel in s.children_mut("channel") {
        if require_str(channel, "type")? == "rest-hook" && !channel.is_present("endpoint") {
            let endpoint = format!("{}subscription-hook", codes::DEFAULT_URI_NAMESPACE);
            channel.set("endpoint", Scalar::Uri(endpoint));
        }
        let payload_ok = channel.str_value("payload").map_or(true, codes::is_mime_type);
        if !payload_ok {
            set_text(channel, "payload", DEFAULT_PAYLOAD);
        }
    }
    Ok(())
}
