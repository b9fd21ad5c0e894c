//! Attribute anonymization over collected records.
//!
//! Rules are keyed by entity type and applied attribute-by-attribute. A
//! producer is either a constant, a deterministic template that may reference
//! the record, a one-way hash of the current value, or a fake-data generator.
//! Unregistered types and attributes pass through untouched.

use crate::catalog::{AttrValue, EntityHandle};
use crate::error::{Error, Result};
use crate::policy::OnAnonymizeError;
use ahash::AHashMap;
use fake::faker::address::en::{CityName, StreetName, ZipCode};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{SafeEmail, Username};
use fake::faker::lorem::en::{Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Value producer for one attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "producer", rename_all = "snake_case")]
pub enum Producer {
    /// Fixed replacement value.
    Constant { value: String },

    /// Replace with NULL.
    Null,

    /// Deterministic template; `{id}`, `{type}`, and `{value}` interpolate
    /// the record identity, entity type, and current attribute value.
    Template { template: String },

    /// One-way SHA-256 of the current value, truncated to 16 hex chars.
    Hash {
        /// Keep the domain of email-shaped values (`x@y` -> `hash@y`).
        #[serde(default)]
        preserve_domain: bool,
    },

    /// Named fake-data generator.
    Fake { generator: String },
}

impl Producer {
    /// Validate at configuration time. Unknown generator names are
    /// configuration faults, not traversal-time surprises.
    pub fn validate(&self) -> Result<()> {
        match self {
            Producer::Constant { value } => {
                if value.is_empty() {
                    return Err(Error::config(
                        "constant producer requires a non-empty value (use the null producer for NULL)",
                    ));
                }
                Ok(())
            }
            Producer::Null | Producer::Hash { .. } => Ok(()),
            Producer::Template { template } => {
                if template.is_empty() {
                    return Err(Error::config("template producer requires a non-empty template"));
                }
                Ok(())
            }
            Producer::Fake { generator } => {
                if fake_value(generator).is_none() {
                    return Err(Error::config(format!(
                        "unknown fake generator: {} (use: email, name, first_name, last_name, phone, username, company, city, zip, street, word, sentence)",
                        generator
                    )));
                }
                Ok(())
            }
        }
    }

    fn produce(&self, record: &EntityHandle, attribute: &str) -> std::result::Result<AttrValue, String> {
        match self {
            Producer::Constant { value } => Ok(AttrValue::Text(value.clone())),
            Producer::Null => Ok(AttrValue::Null),
            Producer::Template { template } => {
                let current = record
                    .attribute(attribute)
                    .map(|v| v.as_display_string())
                    .unwrap_or_default();
                let rendered = template
                    .replace("{id}", &record.identity().to_string())
                    .replace("{type}", record.entity_type())
                    .replace("{value}", &current);
                Ok(AttrValue::Text(rendered))
            }
            Producer::Hash { preserve_domain } => {
                let current = match record.attribute(attribute) {
                    None | Some(AttrValue::Null) => return Ok(AttrValue::Null),
                    Some(v) => v.as_display_string(),
                };
                Ok(AttrValue::Text(hash_value(&current, *preserve_domain)))
            }
            Producer::Fake { generator } => fake_value(generator)
                .map(AttrValue::Text)
                .ok_or_else(|| format!("unknown fake generator: {}", generator)),
        }
    }
}

fn hash_value(value: &str, preserve_domain: bool) -> String {
    if preserve_domain {
        if let Some((local, domain)) = value.rsplit_once('@') {
            let hash = sha256_hex(local);
            return format!("{}@{}", &hash[..8], domain);
        }
    }
    let hash = sha256_hex(value);
    hash[..16].to_string()
}

fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Run a named generator, or `None` if the name is unknown.
fn fake_value(generator: &str) -> Option<String> {
    let value: String = match generator.to_lowercase().as_str() {
        "name" | "full_name" => Name().fake(),
        "first_name" => FirstName().fake(),
        "last_name" => LastName().fake(),
        "email" | "safe_email" => SafeEmail().fake(),
        "phone" | "phone_number" => PhoneNumber().fake(),
        "username" | "user_name" => Username().fake(),
        "company" | "company_name" => CompanyName().fake(),
        "city" => CityName().fake(),
        "zip" | "zipcode" => ZipCode().fake(),
        "street" | "street_name" => StreetName().fake(),
        "word" => Word().fake(),
        "sentence" => Sentence(3..8).fake(),
        _ => return None,
    };
    Some(value)
}

/// Applies a rule table to collected records in place.
pub struct Anonymizer<'a> {
    rules: &'a AHashMap<String, BTreeMap<String, Producer>>,
    on_error: OnAnonymizeError,
}

impl<'a> Anonymizer<'a> {
    pub fn new(
        rules: &'a AHashMap<String, BTreeMap<String, Producer>>,
        on_error: OnAnonymizeError,
    ) -> Self {
        Self { rules, on_error }
    }

    /// Apply every matching rule to every record. Returns warnings gathered
    /// in skip-and-warn mode. A producer failure aborts the rest of that
    /// record's rules; the record itself stays in the set either way.
    pub fn apply(&self, records: &mut [EntityHandle]) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        for record in records.iter_mut() {
            let Some(rules) = self.rules.get(record.entity_type()) else {
                continue;
            };

            for (attribute, producer) in rules {
                match producer.produce(record, attribute) {
                    Ok(value) => record.set_attribute(attribute, value),
                    Err(reason) => {
                        let fault = Error::Anonymization {
                            entity: record.tag(),
                            attribute: attribute.clone(),
                            reason,
                        };
                        match self.on_error {
                            OnAnonymizeError::Fail => return Err(fault),
                            OnAnonymizeError::SkipAndWarn => {
                                warnings.push(fault.to_string());
                                break;
                            }
                        }
                    }
                }
            }
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Identity;

    fn record(entity_type: &str, id: i64, attrs: Vec<(&str, AttrValue)>) -> EntityHandle {
        let mut map = AHashMap::new();
        for (k, v) in attrs {
            map.insert(k.to_string(), v);
        }
        EntityHandle::new(entity_type, Identity::Int(id), map)
    }

    fn rules_for(
        entity_type: &str,
        pairs: Vec<(&str, Producer)>,
    ) -> AHashMap<String, BTreeMap<String, Producer>> {
        let mut inner = BTreeMap::new();
        for (attr, producer) in pairs {
            inner.insert(attr.to_string(), producer);
        }
        let mut rules = AHashMap::new();
        rules.insert(entity_type.to_string(), inner);
        rules
    }

    #[test]
    fn constant_and_null_producers() {
        let rules = rules_for(
            "Patient",
            vec![
                ("ssn", Producer::Constant { value: "000-00-0000".into() }),
                ("notes", Producer::Null),
            ],
        );
        let mut records = vec![record(
            "Patient",
            1,
            vec![("ssn", AttrValue::from("123-45-6789")), ("notes", AttrValue::from("private"))],
        )];

        let warnings = Anonymizer::new(&rules, OnAnonymizeError::Fail)
            .apply(&mut records)
            .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(records[0].attribute("ssn"), Some(&AttrValue::from("000-00-0000")));
        assert_eq!(records[0].attribute("notes"), Some(&AttrValue::Null));
    }

    #[test]
    fn template_producer_references_the_record() {
        let rules = rules_for(
            "Patient",
            vec![("email", Producer::Template { template: "{type}-{id}@example.test".into() })],
        );
        let mut records = vec![record("Patient", 42, vec![("email", AttrValue::from("real@person.com"))])];

        Anonymizer::new(&rules, OnAnonymizeError::Fail)
            .apply(&mut records)
            .unwrap();
        assert_eq!(
            records[0].attribute("email"),
            Some(&AttrValue::from("Patient-42@example.test"))
        );
    }

    #[test]
    fn hash_producer_is_deterministic_and_preserves_domains() {
        let rules = rules_for(
            "User",
            vec![("email", Producer::Hash { preserve_domain: true })],
        );
        let mut a = vec![record("User", 1, vec![("email", AttrValue::from("alice@corp.example"))])];
        let mut b = vec![record("User", 2, vec![("email", AttrValue::from("alice@corp.example"))])];

        let anonymizer = Anonymizer::new(&rules, OnAnonymizeError::Fail);
        anonymizer.apply(&mut a).unwrap();
        anonymizer.apply(&mut b).unwrap();

        let va = a[0].attribute("email").unwrap().as_display_string();
        let vb = b[0].attribute("email").unwrap().as_display_string();
        assert_eq!(va, vb);
        assert!(va.ends_with("@corp.example"));
        assert!(!va.starts_with("alice@"));
    }

    #[test]
    fn hash_of_null_stays_null() {
        let rules = rules_for("User", vec![("email", Producer::Hash { preserve_domain: false })]);
        let mut records = vec![record("User", 1, vec![("email", AttrValue::Null)])];
        Anonymizer::new(&rules, OnAnonymizeError::Fail)
            .apply(&mut records)
            .unwrap();
        assert_eq!(records[0].attribute("email"), Some(&AttrValue::Null));
    }

    #[test]
    fn fake_producer_replaces_value() {
        let rules = rules_for("User", vec![("name", Producer::Fake { generator: "name".into() })]);
        let mut records = vec![record("User", 1, vec![("name", AttrValue::from("Real Name"))])];
        Anonymizer::new(&rules, OnAnonymizeError::Fail)
            .apply(&mut records)
            .unwrap();
        let value = records[0].attribute("name").unwrap().as_display_string();
        assert!(!value.is_empty());
        assert_ne!(value, "Real Name");
    }

    #[test]
    fn unknown_generator_fails_with_context() {
        let rules = rules_for("User", vec![("name", Producer::Fake { generator: "nope".into() })]);
        let mut records = vec![record("User", 7, vec![("name", AttrValue::from("x"))])];

        let err = Anonymizer::new(&rules, OnAnonymizeError::Fail)
            .apply(&mut records)
            .unwrap_err();
        match err {
            Error::Anonymization { entity, attribute, .. } => {
                assert_eq!(entity, "User#7");
                assert_eq!(attribute, "name");
            }
            other => panic!("expected Anonymization fault, got {:?}", other),
        }

        // Skip-and-warn keeps the record and reports instead.
        let warnings = Anonymizer::new(&rules, OnAnonymizeError::SkipAndWarn)
            .apply(&mut records)
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(records[0].attribute("name"), Some(&AttrValue::from("x")));
    }

    #[test]
    fn unregistered_types_pass_through() {
        let rules = rules_for("Patient", vec![("ssn", Producer::Null)]);
        let mut records = vec![record("Provider", 1, vec![("ssn", AttrValue::from("keep"))])];
        Anonymizer::new(&rules, OnAnonymizeError::Fail)
            .apply(&mut records)
            .unwrap();
        assert_eq!(records[0].attribute("ssn"), Some(&AttrValue::from("keep")));
    }

    #[test]
    fn producer_validation() {
        assert!(Producer::Constant { value: "x".into() }.validate().is_ok());
        assert!(Producer::Constant { value: "".into() }.validate().is_err());
        assert!(Producer::Fake { generator: "email".into() }.validate().is_ok());
        assert!(Producer::Fake { generator: "bogus".into() }.validate().is_err());
        assert!(Producer::Template { template: "".into() }.validate().is_err());
    }
}
