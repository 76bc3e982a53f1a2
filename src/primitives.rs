//! Primitive Synthesizer
//!
//! Produces leaf values for primitive type tags. Synthesis never fails: every
//! value is valid for its primitive tag by construction. Composite-level
//! constraints are left to the repair pass.
//!
//! ## Policies
//!
//! - textual payloads are base64 of 8 to 24 random bytes, so never empty
//! - integers are strictly positive so every integer subtype accepts them
//! - decimals are redrawn until their JSON rendering has no exponent
//! - temporal tags render the current time at the tag's precision
//! - bound codes sample the binding's explicit table, or fall back to the
//!   well-known language and MIME-type value sets

use crate::catalog::{Binding, TypeTag};
use crate::codes;
use crate::identifiers::next_hierarchical_id_with;
use crate::instance::Scalar;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::{Builder, Uuid};

const MIN_PAYLOAD_BYTES: usize = 8;
const MAX_PAYLOAD_BYTES: usize = 24;
const MAX_INTEGER: i64 = 10_000;
const MAX_DECIMAL_SCALE: u32 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTag {
    String,
    Markdown,
    Base64Binary,
    Id,
    Boolean,
    Integer,
    UnsignedInt,
    PositiveInt,
    Decimal,
    Date,
    DateTime,
    Instant,
    Time,
    Uri,
    Url,
    Canonical,
    Oid,
    Uuid,
    Code,
}

impl PrimitiveTag {
    pub fn from_tag(tag: &TypeTag) -> Option<Self> {
        let parsed = match tag.as_str() {
            "string" => PrimitiveTag::String,
            "markdown" => PrimitiveTag::Markdown,
            "base64Binary" => PrimitiveTag::Base64Binary,
            "id" => PrimitiveTag::Id,
            "boolean" => PrimitiveTag::Boolean,
            "integer" => PrimitiveTag::Integer,
            "unsignedInt" => PrimitiveTag::UnsignedInt,
            "positiveInt" => PrimitiveTag::PositiveInt,
            "decimal" => PrimitiveTag::Decimal,
            "date" => PrimitiveTag::Date,
            "dateTime" => PrimitiveTag::DateTime,
            "instant" => PrimitiveTag::Instant,
            "time" => PrimitiveTag::Time,
            "uri" => PrimitiveTag::Uri,
            "url" => PrimitiveTag::Url,
            "canonical" => PrimitiveTag::Canonical,
            "oid" => PrimitiveTag::Oid,
            "uuid" => PrimitiveTag::Uuid,
            "code" => PrimitiveTag::Code,
            _ => return None,
        };
        Some(parsed)
    }
}

/// Whether a decimal renders without exponent notation in its JSON form.
pub fn is_canonical_decimal(value: f64) -> bool {
    value.is_finite()
        && serde_json::to_string(&value)
            .map(|rendered| !rendered.contains(['e', 'E']))
            .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct PrimitiveSynthesizer {
    uri_namespace: String,
}

impl Default for PrimitiveSynthesizer {
    fn default() -> Self {
        PrimitiveSynthesizer::new(codes::DEFAULT_URI_NAMESPACE)
    }
}

impl PrimitiveSynthesizer {
    pub fn new(uri_namespace: impl Into<String>) -> Self {
        PrimitiveSynthesizer {
            uri_namespace: uri_namespace.into(),
        }
    }

    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        tag: PrimitiveTag,
        binding: Option<&Binding>,
    ) -> Scalar {
        match tag {
            PrimitiveTag::String => Scalar::String(self.payload(rng)),
            PrimitiveTag::Markdown => Scalar::String(self.payload(rng)),
            PrimitiveTag::Base64Binary => Scalar::Binary(self.payload(rng)),
            PrimitiveTag::Id => Scalar::Id(random_uuid(rng).to_string()),
            PrimitiveTag::Boolean => Scalar::Boolean(rng.gen()),
            PrimitiveTag::Integer | PrimitiveTag::UnsignedInt | PrimitiveTag::PositiveInt => {
                Scalar::Integer(rng.gen_range(1..=MAX_INTEGER))
            }
            PrimitiveTag::Decimal => Scalar::Decimal(self.decimal(rng)),
            PrimitiveTag::Date => Scalar::Date(Utc::now().format("%Y-%m-%d").to_string()),
            PrimitiveTag::DateTime => {
                Scalar::DateTime(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            PrimitiveTag::Instant => {
                Scalar::DateTime(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            PrimitiveTag::Time => Scalar::Time(Utc::now().format("%H:%M:%S").to_string()),
            PrimitiveTag::Uri | PrimitiveTag::Url | PrimitiveTag::Canonical => {
                Scalar::Uri(self.uri(rng))
            }
            PrimitiveTag::Oid => Scalar::Uri(next_hierarchical_id_with(rng)),
            PrimitiveTag::Uuid => Scalar::Uri(format!("urn:uuid:{}", random_uuid(rng))),
            PrimitiveTag::Code => match binding {
                Some(binding) => self.bound_code(rng, binding),
                None => Scalar::Code(self.payload(rng)),
            },
        }
    }

    pub fn uri<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let mut bytes = [0u8; 12];
        rng.fill(&mut bytes[..]);
        format!("{}{}", self.uri_namespace, URL_SAFE_NO_PAD.encode(bytes))
    }

    fn payload<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let len = rng.gen_range(MIN_PAYLOAD_BYTES..=MAX_PAYLOAD_BYTES);
        let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        STANDARD.encode(bytes)
    }

    fn decimal<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        loop {
            let scale = rng.gen_range(1..=MAX_DECIMAL_SCALE) as f64;
            let candidate = rng.gen::<f64>() * scale;
            if is_canonical_decimal(candidate) {
                return candidate;
            }
            log::debug!("redrawing decimal {} rendered with an exponent", candidate);
        }
    }

    fn bound_code<R: Rng + ?Sized>(&self, rng: &mut R, binding: &Binding) -> Scalar {
        if let Some((_, code)) = sample_code_table(rng, binding) {
            return Scalar::Code(code.to_string());
        }
        if binding.value_set == codes::LANGUAGES_VALUE_SET {
            return Scalar::Code(codes::DEFAULT_LANGUAGE.to_string());
        }
        if binding.value_set == codes::MIME_TYPES_VALUE_SET {
            return Scalar::Code(sample_mime_type(rng).to_string());
        }
        Scalar::Code(self.payload(rng))
    }
}

/// Uniformly pick a coding system from the binding's table, then a code from that system.
pub fn sample_code_table<'b, R: Rng + ?Sized>(
    rng: &mut R,
    binding: &'b Binding,
) -> Option<(&'b str, &'b str)> {
    let table = binding.code_table()?;
    let systems: Vec<(&String, &Vec<String>)> =
        table.iter().filter(|(_, codes)| !codes.is_empty()).collect();
    let (system, codes) = systems.choose(rng)?;
    let code = codes.choose(rng)?;
    Some((system.as_str(), code.as_str()))
}

pub fn sample_mime_type<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    codes::MIME_TYPES.choose(rng).copied().unwrap_or("application/octet-stream")
}

/// Version 4 UUID whose random bits come from `rng`.
fn random_uuid<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    Builder::from_random_bytes(rng.gen()).into_uuid()
}
