//! Extraction instruction sent to the VLM alongside each card image.
//!
//! Keeping the instruction here makes it the single place to change the
//! requested shape or business rules, and lets tests inspect it without a
//! live model. Callers can override it via
//! [`crate::config::ScanConfig::instruction`].
//!
//! The model is *asked* to honour these rules; [`crate::pipeline::normalize`]
//! re-applies the structural ones regardless of what comes back.

/// JSON template describing the target shape of one card.
pub const SCHEMA_TEMPLATE: &str = r#"{
  "company_name": "",
  "contact_person": [
    {
      "name": "",
      "position": "",
      "personal_phone": [""],
      "personal_email": [""]
    }
  ],
  "company_address": [
    {
      "remaining": "",
      "city": "",
      "state": "",
      "country": "",
      "pincode": ""
    }
  ],
  "company_email": [""],
  "company_phone": [""],
  "company_fax": [""],
  "company_website": [""],
  "company_gstin": [""],
  "company_details_if_any": [""]
}"#;

/// Rules appended after the template.
pub const EXTRACTION_RULES: &str = r#"Follow these instructions:
- Return only the JSON object without any explanations or additional text.
- If a field is missing or information is not available, use null for that field. Never omit a key.
- If multiple images are uploaded, provide separate JSON objects for each image.
- For unreadable or unclear images: provide a JSON object in which all fields are null and include a description of the issue in the "company_name" field.
- If the state or country is missing, infer them based on the city.
- Format phone numbers with the appropriate country code based on the country."#;

/// Build the default instruction: template plus rules.
pub fn default_instruction() -> String {
    format!(
        "Extract details from each business card image and format them as JSON objects following this schema:\n{}\n{}",
        SCHEMA_TEMPLATE, EXTRACTION_RULES
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CARD_FIELDS;

    #[test]
    fn template_is_valid_json_with_every_field() {
        let value: serde_json::Value = serde_json::from_str(SCHEMA_TEMPLATE).unwrap();
        let obj = value.as_object().unwrap();
        for key in CARD_FIELDS {
            assert!(obj.contains_key(key), "template missing {key}");
        }
    }

    #[test]
    fn instruction_carries_business_rules() {
        let text = default_instruction();
        assert!(text.contains("use null"));
        assert!(text.contains("unreadable"));
        assert!(text.contains("infer them based on the city"));
        assert!(text.contains("country code"));
    }
}
