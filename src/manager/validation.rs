//! Validation rules applied to a merged snapshot before it is published.

use crate::snapshot::ConfigSnapshot;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Predicate over a present value.
pub type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A constraint on one configuration key.
#[derive(Clone)]
pub struct ValidationRule {
    key: String,
    required: bool,
    predicate: Option<Predicate>,
    error_message: Option<String>,
}

impl ValidationRule {
    /// Key must be present and non-blank.
    pub fn required(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            required: true,
            predicate: None,
            error_message: None,
        }
    }

    /// Key may be absent; a predicate, if any, only runs when it is present.
    pub fn optional(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            required: false,
            predicate: None,
            error_message: None,
        }
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Message reported when the predicate rejects the value.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Value must be one of `allowed`.
    pub fn one_of(self, allowed: &[&str]) -> Self {
        let allowed: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
        self.with_predicate(move |value| allowed.iter().any(|a| a == value))
    }

    /// Value must parse as `T`.
    pub fn parses_as<T: std::str::FromStr>(self) -> Self {
        self.with_predicate(|value| value.trim().parse::<T>().is_ok())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    fn check(&self, snapshot: &ConfigSnapshot) -> Option<String> {
        let value = snapshot.get(&self.key);

        if self.required && value.map_or(true, |v| v.trim().is_empty()) {
            return Some(format!("Required configuration variable '{}' is missing", self.key));
        }

        let value = value?;
        let predicate = self.predicate.as_ref()?;
        if predicate(value) {
            return None;
        }

        Some(self.error_message.clone().unwrap_or_else(|| {
            format!("Configuration variable '{}' has an invalid value", self.key)
        }))
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("key", &self.key)
            .field("required", &self.required)
            .field("has_predicate", &self.predicate.is_some())
            .field("error_message", &self.error_message)
            .finish()
    }
}

/// Every violation found, in rule order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Check every rule against the snapshot. Never stops at the first failure.
pub fn validate(snapshot: &ConfigSnapshot, rules: &[ValidationRule]) -> ValidationReport {
    let errors: Vec<String> = rules
        .iter()
        .filter_map(|rule| rule.check(snapshot))
        .collect();
    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}
