//! Request field validation with per-field error collection.

use crate::auth::errors::AuthError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

pub const MAX_STRING_LEN: usize = 255;
pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
            .expect("email regex is valid");
}

/// Validation messages keyed by field name.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// First message, with a count of the rest
    pub fn summary(&self) -> String {
        let mut messages = self.0.values().flatten();
        let Some(first) = messages.next() else {
            return "The given data was invalid.".to_string();
        };
        match messages.count() {
            0 => first.clone(),
            1 => format!("{} (and 1 more error)", first),
            n => format!("{} (and {} more errors)", first, n),
        }
    }

    pub fn into_result(self) -> Result<(), AuthError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(self))
        }
    }

    /// Required string no longer than `MAX_STRING_LEN`
    pub fn required_string(&mut self, field: &'static str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.add(field, format!("The {} field is required.", field));
            return false;
        }
        if value.chars().count() > MAX_STRING_LEN {
            self.add(
                field,
                format!(
                    "The {} field must not be greater than {} characters.",
                    field, MAX_STRING_LEN
                ),
            );
            return false;
        }
        true
    }

    pub fn email(&mut self, field: &'static str, value: &str) -> bool {
        if !self.required_string(field, value) {
            return false;
        }
        if !is_valid_email(value) {
            self.add(
                field,
                format!("The {} field must be a valid email address.", field),
            );
            return false;
        }
        true
    }

    pub fn password(&mut self, field: &'static str, value: &str) -> bool {
        if value.is_empty() {
            self.add(field, format!("The {} field is required.", field));
            return false;
        }
        if value.chars().count() < MIN_PASSWORD_LEN {
            self.add(
                field,
                format!(
                    "The {} field must be at least {} characters.",
                    field, MIN_PASSWORD_LEN
                ),
            );
            return false;
        }
        true
    }
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}
