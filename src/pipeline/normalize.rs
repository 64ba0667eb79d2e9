//! Normalization: coerce whatever JSON object the VLM produced into a
//! [`CardRecord`].
//!
//! The prompt asks for an exact shape, but models drift: a lone email comes
//! back as a bare string instead of a one-element list, a list entry comes
//! back as `{"email": "…"}`, a missing field is dropped instead of `null`, a
//! postal code comes back as a number. Every such case maps to the nearest
//! conforming value here.
//!
//! [`normalize`] is total. It never fails and never panics; the worst input
//! yields [`CardRecord::default`]. Running it on its own serialised output
//! returns the same record.
//!
//! ## Coercion rules
//!
//! | Raw value            | Single field (`city`, …) | List field (`company_email`, …) |
//! |----------------------|--------------------------|---------------------------------|
//! | missing / `null`     | `None`                   | `[]`                            |
//! | `"text"`             | `Some` unless blank      | `["text"]`                      |
//! | number / bool        | `Some(to_string)`        | `["to_string"]`                 |
//! | `[a, b]`             | first present value      | each element, nested lists flattened |
//! | `{"k1": v1, …}`      | first present value      | `[v1]`, first value only (`[null]` for `{}`) |
//!
//! Mappings are read in the order the model wrote them (`serde_json` is built
//! with `preserve_order`), so "first value" means the first key in the reply.
//!
//! `company_name` is stricter: only a non-empty string is kept, unchanged.

use crate::schema::{CardRecord, CompanyAddress, ContactPerson, FieldValue};
use serde_json::{Map, Value};

/// Normalize one raw card object.
pub fn normalize(raw: &Map<String, Value>) -> CardRecord {
    CardRecord {
        company_name: raw.get("company_name").and_then(strict_text),
        contact_person: object_list(raw.get("contact_person"), contact_from_object, |name| {
            ContactPerson {
                name: Some(name),
                ..Default::default()
            }
        }),
        company_address: object_list(raw.get("company_address"), address_from_object, |line| {
            CompanyAddress {
                remaining: Some(line),
                ..Default::default()
            }
        }),
        company_email: field_list(raw.get("company_email")),
        company_phone: field_list(raw.get("company_phone")),
        company_fax: field_list(raw.get("company_fax")),
        company_website: field_list(raw.get("company_website")),
        company_gstin: field_list(raw.get("company_gstin")),
        company_details_if_any: field_list(raw.get("company_details_if_any")),
    }
}

/// Normalize any JSON value; non-objects yield an all-absent record.
pub fn normalize_value(raw: &Value) -> CardRecord {
    match raw {
        Value::Object(map) => normalize(map),
        _ => CardRecord::default(),
    }
}

fn contact_from_object(obj: &Map<String, Value>) -> ContactPerson {
    ContactPerson {
        name: obj.get("name").and_then(single_text),
        position: obj.get("position").and_then(single_text),
        personal_phone: field_list(obj.get("personal_phone")),
        personal_email: field_list(obj.get("personal_email")),
    }
}

fn address_from_object(obj: &Map<String, Value>) -> CompanyAddress {
    CompanyAddress {
        remaining: obj.get("remaining").and_then(single_text),
        city: obj.get("city").and_then(single_text),
        state: obj.get("state").and_then(single_text),
        country: obj.get("country").and_then(single_text),
        pincode: obj.get("pincode").and_then(single_text),
    }
}

/// `company_name` rule: a non-empty string, passed through unchanged.
fn strict_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Single-valued field: best available text, `None` when blank or absent.
fn single_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => (!s.trim().is_empty()).then(|| s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => items.iter().find_map(single_text),
        Value::Object(map) => map.values().find_map(single_text),
    }
}

/// Multi-valued field at record or contact level.
fn field_list(value: Option<&Value>) -> Vec<FieldValue> {
    let mut out = Vec::new();
    match value {
        None | Some(Value::Null) => {}
        Some(other) => push_element(other, &mut out),
    }
    out
}

/// Append the list entries `value` contributes.
fn push_element(value: &Value, out: &mut Vec<FieldValue>) {
    match value {
        Value::Null => out.push(None),
        Value::String(s) => out.push(Some(s.clone())),
        Value::Number(n) => out.push(Some(n.to_string())),
        Value::Bool(b) => out.push(Some(b.to_string())),
        Value::Array(items) => {
            for item in items {
                push_element(item, out);
            }
        }
        Value::Object(map) => out.push(map.values().next().and_then(element_text)),
    }
}

/// Text of the value a mapping entry stands for.
fn element_text(value: &Value) -> FieldValue {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => items.iter().find_map(element_text),
        Value::Object(map) => map.values().next().and_then(element_text),
    }
}

/// List of nested objects (contacts, addresses).
///
/// A single object is wrapped; a bare string becomes the object's primary
/// text field via `from_text`; `null` entries are dropped.
fn object_list<T>(
    value: Option<&Value>,
    from_object: fn(&Map<String, Value>) -> T,
    from_text: impl Fn(String) -> T + Copy,
) -> Vec<T> {
    let mut out = Vec::new();
    if let Some(value) = value {
        push_object(value, from_object, from_text, &mut out);
    }
    out
}

fn push_object<T>(
    value: &Value,
    from_object: fn(&Map<String, Value>) -> T,
    from_text: impl Fn(String) -> T + Copy,
    out: &mut Vec<T>,
) {
    match value {
        Value::Null => {}
        Value::Object(map) => out.push(from_object(map)),
        Value::Array(items) => {
            for item in items {
                push_object(item, from_object, from_text, out);
            }
        }
        scalar => {
            if let Some(text) = single_text(scalar) {
                out.push(from_text(text));
            }
        }
    }
}
