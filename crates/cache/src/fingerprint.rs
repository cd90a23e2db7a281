//! Deterministic cache keys.
//!
//! The fingerprint is the SHA-256 of a canonical JSON rendering of the
//! call identity: sorted object keys, UTF-8, no insignificant whitespace.
//! Binary inputs never enter the key directly — they are represented by
//! their content hashes, sorted. The encoding is part of the on-disk cache
//! contract and must stay bit-stable.

use std::fmt::Write as _;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Identity of one provider call, for key derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintInput<'a> {
    /// Model identity string: `service/model_name`.
    pub model_identity: &'a str,
    /// Sampling parameters as a JSON object.
    pub parameters: &'a Value,
    /// Rendered system prompt.
    pub system_prompt: &'a str,
    /// Rendered user prompt.
    pub user_prompt: &'a str,
    /// Iteration number; distinct iterations coexist in the cache.
    pub iteration: u32,
    /// Content hashes of any attached files.
    pub file_hashes: &'a [String],
}

impl FingerprintInput<'_> {
    /// Compute the cache key for this call.
    pub fn fingerprint(&self) -> String {
        let mut canonical = String::new();
        canonical.push('{');

        if !self.file_hashes.is_empty() {
            let mut hashes: Vec<&String> = self.file_hashes.iter().collect();
            hashes.sort();

            canonical.push_str("\"files\":[");
            for (i, hash) in hashes.iter().enumerate() {
                if i > 0 {
                    canonical.push(',');
                }
                write_json_string(&mut canonical, hash);
            }
            canonical.push_str("],");
        }

        let _ = write!(canonical, "\"iteration\":{},", self.iteration);
        canonical.push_str("\"model\":");
        write_json_string(&mut canonical, self.model_identity);
        canonical.push_str(",\"parameters\":");
        write_canonical(&mut canonical, self.parameters);
        canonical.push_str(",\"system\":");
        write_json_string(&mut canonical, self.system_prompt);
        canonical.push_str(",\"user\":");
        write_json_string(&mut canonical, self.user_prompt);
        canonical.push('}');

        sha256_hex(&canonical)
    }
}

/// Lowercase hex SHA-256 of a string.
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(64);

    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }

    hex
}

/// Canonical JSON: object keys sorted, arrays in order, compact
/// separators.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => write_json_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(out, key);
                out.push(':');
                if let Some(value) = map.get(*key) {
                    write_canonical(out, value);
                }
            }
            out.push('}');
        }
    }
}

fn write_json_string(out: &mut String, s: &str) {
    // serde_json escapes exactly per RFC 8259; reuse it for stability.
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => out.push_str("\"\""),
    }
}
