//! Field validation for instance records.
//!
//! Validation runs before any provisioning call. A record that fails it is
//! not retried until a user edits it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::instance::Instance;

/// Longest name the runtime layer accepts for a backing resource.
pub const MAX_BACKING_RESOURCE_KEY_LEN: usize = 253;

/// A single violated field constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// JSON path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub reason: String,
}

impl FieldError {
    /// Create a new field error.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl Instance {
    /// Check the spec before it is sent to the provisioning service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInstance`] listing every violated field.
    pub fn validate(&self) -> Result<()> {
        let errors = self.field_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::invalid_instance(self.key().to_string(), errors))
        }
    }

    fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.metadata.name.is_empty() {
            errors.push(FieldError::new("metadata.name", "must not be empty"));
        }

        let resource = &self.spec.resource;
        for (field, value) in [
            ("spec.resource.cpuLimit", resource.cpu_limit),
            ("spec.resource.ramLimit", resource.ram_limit),
            ("spec.resource.diskLimit", resource.disk_limit),
        ] {
            if value < 1 {
                errors.push(FieldError::new(
                    field,
                    format!("must be at least 1, got {value}"),
                ));
            }
        }

        let environment = &self.spec.environment;
        if environment.owner.is_empty() {
            errors.push(FieldError::new("spec.environment.owner", "must not be empty"));
        }
        if environment.os.trim().is_empty() {
            errors.push(FieldError::new("spec.environment.os", "must not be empty"));
        }

        if !environment.owner.is_empty() && !self.metadata.name.is_empty() {
            let key = self.backing_resource_key();
            if let Some(reason) = dns_subdomain_violation(&key) {
                errors.push(FieldError::new(
                    "spec.environment.owner",
                    format!("backing resource name '{key}' {reason}"),
                ));
            }
        }

        errors
    }
}

/// Describe why `value` is not a DNS-1123 subdomain, if it is not one.
fn dns_subdomain_violation(value: &str) -> Option<String> {
    if value.len() > MAX_BACKING_RESOURCE_KEY_LEN {
        return Some(format!(
            "is longer than {MAX_BACKING_RESOURCE_KEY_LEN} characters"
        ));
    }
    value.split('.').find_map(dns_label_violation)
}

/// Describe why one dot-separated label is malformed.
fn dns_label_violation(label: &str) -> Option<String> {
    if !label
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Some("may only contain lowercase alphanumerics, '-' and '.'".to_string());
    }
    let alphanumeric = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    match (label.chars().next(), label.chars().last()) {
        (Some(first), Some(last)) if alphanumeric(first) && alphanumeric(last) => None,
        _ => Some("must start and end each label with an alphanumeric character".to_string()),
    }
}
