//! Hierarchical identifier synthesis.
//!
//! Identifiers take the shape `urn:oid:1.2.<n>[.<n>...]`: a fixed root
//! followed by one to twelve positive numeric segments. Values are purely
//! random; two calls may collide, and callers that need uniqueness must
//! track issued values themselves.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

pub const OID_ROOT: &str = "urn:oid:1.2";
pub const MAX_SEGMENTS: usize = 12;
pub const MAX_SEGMENT_VALUE: u32 = 100;

static HIERARCHICAL_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^urn:oid:1\.2(\.[1-9][0-9]*){1,12}$").expect("identifier grammar compiles")
});

pub fn next_hierarchical_id_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let segments = rng.gen_range(1..=MAX_SEGMENTS);
    let mut id = String::from(OID_ROOT);
    for _ in 0..segments {
        let segment = rng.gen_range(1..=MAX_SEGMENT_VALUE);
        id.push('.');
        id.push_str(&segment.to_string());
    }
    id
}

pub fn is_hierarchical_id(candidate: &str) -> bool {
    HIERARCHICAL_ID.is_match(candidate)
}

/// Drop everything outside `[A-Za-z0-9]`.
pub fn strip_non_alphanumeric(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}
