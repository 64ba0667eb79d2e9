//! The target shape of one business card's extracted data.
//!
//! Every field of [`CardRecord`] is always present once a card has been
//! normalized. Single-valued fields use `None` as the absence marker (it
//! serialises as JSON `null`); multi-valued fields are lists, where an empty
//! list means "nothing found" and a `None` element means the service emitted
//! an entry that carried no value.

use serde::{Deserialize, Serialize};

/// Placeholder shown for an absent value in human-readable output.
pub const NOT_FOUND: &str = "Not found";

/// One entry of a multi-valued field. `None` is the absence marker.
pub type FieldValue = Option<String>;

/// Normalized contact data for a single business card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    /// Company name, or the diagnostic text for an unreadable card.
    pub company_name: Option<String>,
    pub contact_person: Vec<ContactPerson>,
    pub company_address: Vec<CompanyAddress>,
    pub company_email: Vec<FieldValue>,
    pub company_phone: Vec<FieldValue>,
    pub company_fax: Vec<FieldValue>,
    pub company_website: Vec<FieldValue>,
    pub company_gstin: Vec<FieldValue>,
    pub company_details_if_any: Vec<FieldValue>,
}

/// A person printed on the card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPerson {
    pub name: Option<String>,
    pub position: Option<String>,
    pub personal_phone: Vec<FieldValue>,
    pub personal_email: Vec<FieldValue>,
}

/// A postal address. `remaining` holds everything that is not city, state,
/// country or postal code (street, building, floor).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyAddress {
    pub remaining: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub pincode: Option<String>,
}

/// Top-level keys of [`CardRecord`], in schema order.
pub const CARD_FIELDS: [&str; 9] = [
    "company_name",
    "contact_person",
    "company_address",
    "company_email",
    "company_phone",
    "company_fax",
    "company_website",
    "company_gstin",
    "company_details_if_any",
];

impl CardRecord {
    /// Build the record the service returns for a card it could not read:
    /// everything absent except `company_name`, which carries the diagnostic.
    pub fn unreadable(diagnostic: impl Into<String>) -> Self {
        Self {
            company_name: Some(diagnostic.into()),
            ..Self::default()
        }
    }

    /// `true` when only `company_name` holds a value.
    ///
    /// Such a record is still a successful extraction: the service read the
    /// image and reported that nothing on it was legible. The check is on
    /// shape alone, so a genuine card that shows nothing but a company name
    /// (or entries that are all `null`) is counted the same way.
    pub fn is_unreadable(&self) -> bool {
        self.company_name.is_some()
            && self.contact_person.is_empty()
            && self.company_address.is_empty()
            && [
                &self.company_email,
                &self.company_phone,
                &self.company_fax,
                &self.company_website,
                &self.company_gstin,
                &self.company_details_if_any,
            ]
            .iter()
            .all(|list| list.iter().all(Option::is_none))
    }

    /// Number of contact persons plus every non-absent list entry.
    pub fn populated_entries(&self) -> usize {
        let lists = [
            &self.company_email,
            &self.company_phone,
            &self.company_fax,
            &self.company_website,
            &self.company_gstin,
            &self.company_details_if_any,
        ];
        self.contact_person.len()
            + self.company_address.len()
            + lists
                .iter()
                .map(|l| l.iter().filter(|v| v.is_some()).count())
                .sum::<usize>()
    }
}

/// Render an optional value for display, substituting [`NOT_FOUND`].
pub fn display_value(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(NOT_FOUND)
}

/// Render a list as a comma-separated string, skipping absent entries.
///
/// Returns [`NOT_FOUND`] when the list has no present entries.
pub fn display_list(values: &[FieldValue]) -> String {
    let present: Vec<&str> = values.iter().filter_map(|v| v.as_deref()).collect();
    if present.is_empty() {
        NOT_FOUND.to_string()
    } else {
        present.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_serialise_as_null_not_omitted() {
        let json = serde_json::to_value(CardRecord::default()).unwrap();
        let obj = json.as_object().unwrap();
        for key in CARD_FIELDS {
            assert!(obj.contains_key(key), "missing key {key}");
        }
        assert!(obj["company_name"].is_null());
        assert_eq!(obj["company_phone"], serde_json::json!([]));
    }

    #[test]
    fn nested_absent_fields_serialise_as_null() {
        let json = serde_json::to_value(CompanyAddress::default()).unwrap();
        assert!(json["pincode"].is_null());
        assert!(json["remaining"].is_null());
    }

    #[test]
    fn unreadable_marker_round_trip() {
        let rec = CardRecord::unreadable("image too blurry to read");
        assert!(rec.is_unreadable());
        assert_eq!(rec.company_name.as_deref(), Some("image too blurry to read"));
        assert_eq!(rec.populated_entries(), 0);
    }

    #[test]
    fn name_only_card_counts_as_unreadable() {
        let rec = CardRecord {
            company_name: Some("Acme Pvt Ltd".into()),
            company_email: vec![None],
            ..Default::default()
        };
        assert!(rec.is_unreadable());
    }

    #[test]
    fn record_with_contact_is_not_unreadable() {
        let rec = CardRecord {
            company_name: Some("Acme".into()),
            company_phone: vec![Some("+1 555 0100".into())],
            ..Default::default()
        };
        assert!(!rec.is_unreadable());
        assert_eq!(rec.populated_entries(), 1);
    }

    #[test]
    fn display_helpers_fall_back_to_not_found() {
        assert_eq!(display_value(&None), NOT_FOUND);
        assert_eq!(display_value(&Some("x".into())), "x");
        assert_eq!(display_list(&[None]), NOT_FOUND);
        assert_eq!(
            display_list(&[Some("a".into()), None, Some("b".into())]),
            "a, b"
        );
    }
}
