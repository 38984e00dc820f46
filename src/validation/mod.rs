//! Declarative field-level input validation.
//!
//! A [`Schema`] pairs field names with [`FieldRules`]. Validation
//! short-circuits per field after the first failing rule but visits every
//! field before returning, so the caller can report all problems at once.
//! Pure functions, no I/O.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Basic email shape; full RFC validation is the mail system's problem.
pub static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap_or_else(|_| unreachable!("static regex"))
});

/// RFC 5321 upper bound for an address.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Field name → first failing message.
pub type FieldErrors = BTreeMap<String, String>;

/// Field name → submitted value.
pub type FieldValues = BTreeMap<String, String>;

/// Cross-field rule: receives the field value and every submitted value,
/// returns a message when the rule fails.
pub type CustomRule = Box<dyn Fn(&str, &FieldValues) -> Option<String> + Send + Sync>;

/// Rules for one field, applied in declaration order: `required`,
/// `min_length`, `max_length`, `pattern`, then `custom` rules.
#[derive(Default)]
pub struct FieldRules {
    required: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<(&'static Regex, &'static str)>,
    custom: Vec<CustomRule>,
}

impl FieldRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    #[must_use]
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    #[must_use]
    pub fn pattern(mut self, pattern: &'static Regex, message: &'static str) -> Self {
        self.pattern = Some((pattern, message));
        self
    }

    #[must_use]
    pub fn custom<F>(mut self, rule: F) -> Self
    where
        F: Fn(&str, &FieldValues) -> Option<String> + Send + Sync + 'static,
    {
        self.custom.push(Box::new(rule));
        self
    }

    /// First failing message for `value`, or `None` when every rule passes.
    fn check(&self, field: &str, value: &str, all: &FieldValues) -> Option<String> {
        if value.is_empty() {
            // Optional empty fields skip the remaining rules.
            return self.required.then(|| format!("{field} is required"));
        }
        if let Some(min) = self.min_length
            && value.len() < min
        {
            return Some(format!("{field} must be at least {min} characters"));
        }
        if let Some(max) = self.max_length
            && value.len() > max
        {
            return Some(format!("{field} cannot exceed {max} characters"));
        }
        if let Some((pattern, message)) = &self.pattern
            && !pattern.is_match(value)
        {
            return Some((*message).to_string());
        }
        for rule in &self.custom {
            if let Some(message) = rule(value, all) {
                return Some(message);
            }
        }
        None
    }
}

/// Ordered collection of per-field rules.
#[derive(Default)]
pub struct Schema {
    fields: Vec<(&'static str, FieldRules)>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, name: &'static str, rules: FieldRules) -> Self {
        self.fields.push((name, rules));
        self
    }

    /// Validate `values` against every field, collecting all failures.
    #[must_use]
    pub fn validate(&self, values: &FieldValues) -> ValidationReport {
        let mut errors = FieldErrors::new();
        for (name, rules) in &self.fields {
            let value = values.get(*name).map(String::as_str).unwrap_or_default();
            if let Some(message) = rules.check(name, value, values) {
                errors.insert((*name).to_string(), message);
            }
        }
        ValidationReport { errors }
    }
}

/// Outcome of a validation run.
#[derive(Clone, Debug)]
pub struct ValidationReport {
    pub errors: FieldErrors,
}

impl ValidationReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}
