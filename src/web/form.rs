//! Field validation for posted forms. Inputs arrive as strings so that an
//! empty select yields a field error instead of a deserialization failure.

use serde::Serialize;
use std::collections::BTreeMap;

pub const REQUIRED: &str = "Este campo es obligatorio.";
pub const INVALID_CHOICE: &str = "Seleccione una opción válida.";
pub const INVALID_EMAIL: &str = "Ingrese un correo electrónico válido.";

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<&'static str, String>);

impl FormErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Flags `field` unless the chosen row is one the form offered.
    pub fn choice(&mut self, field: &'static str, offered: bool) {
        if !offered {
            self.add(field, INVALID_CHOICE);
        }
    }

    pub fn into_result(self) -> Result<(), FormErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Trimmed, non-empty text.
    pub fn text<'a>(&mut self, field: &'static str, value: &'a str) -> Option<&'a str> {
        let value = value.trim();
        if value.is_empty() {
            self.add(field, REQUIRED);
            return None;
        }
        Some(value)
    }

    /// Required address of the form `local@domain.tld`.
    pub fn email<'a>(&mut self, field: &'static str, value: &'a str) -> Option<&'a str> {
        let value = self.text(field, value)?;
        if !is_valid_email(value) {
            self.add(field, INVALID_EMAIL);
            return None;
        }
        Some(value)
    }

    /// A positive row id chosen from a select.
    pub fn id(&mut self, field: &'static str, value: &str) -> Option<i32> {
        match parse_id(value) {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                self.add(field, REQUIRED);
                None
            }
            Err(()) => {
                self.add(field, INVALID_CHOICE);
                None
            }
        }
    }

    /// Like `id`, but blank means "none".
    pub fn optional_id(&mut self, field: &'static str, value: &str) -> Option<i32> {
        match parse_id(value) {
            Ok(id) => id,
            Err(()) => {
                self.add(field, INVALID_CHOICE);
                None
            }
        }
    }
}

fn parse_id(value: &str) -> Result<Option<i32>, ()> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<i32>() {
        Ok(id) if id > 0 => Ok(Some(id)),
        _ => Err(()),
    }
}

pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    })
}

/// Trimmed text, `None` when blank.
pub fn optional_text(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_are_reported_once() {
        let mut errors = FormErrors::default();
        assert_eq!(errors.text("name", "   "), None);
        assert_eq!(errors.id("name", ""), None);
        assert_eq!(errors.get("name"), Some(REQUIRED));
        assert!(!errors.is_empty());
    }

    #[test]
    fn ids_must_be_positive_integers() {
        let mut errors = FormErrors::default();
        assert_eq!(errors.id("owner_id", " 12 "), Some(12));
        assert_eq!(errors.id("leader_id", "-1"), None);
        assert_eq!(errors.get("leader_id"), Some(INVALID_CHOICE));
        assert_eq!(errors.optional_id("crew_id", ""), None);
        assert!(errors.get("crew_id").is_none());
    }

    #[test]
    fn choices_outside_the_offered_set_are_invalid() {
        let mut errors = FormErrors::default();
        errors.choice("crew_id", true);
        assert!(errors.get("crew_id").is_none());
        errors.choice("crew_id", false);
        assert_eq!(errors.get("crew_id"), Some(INVALID_CHOICE));
        assert!(errors.into_result().is_err());
        assert!(FormErrors::default().into_result().is_ok());
    }

    #[test]
    fn email_must_have_local_part_and_dotted_domain() {
        assert!(is_valid_email("mrojas@municipio.cl"));
        assert!(is_valid_email("obras.norte@sub.municipio.cl"));
        for bad in ["@municipio.cl", "mrojas@", "mrojas@municipio", "a@b@c.cl", "m rojas@x.cl", "x@.cl", "x@-a.cl"] {
            assert!(!is_valid_email(bad), "{bad}");
        }

        let mut errors = FormErrors::default();
        assert_eq!(errors.email("email", "  "), None);
        assert_eq!(errors.get("email"), Some(REQUIRED));
        assert_eq!(errors.email("otro", "sin-arroba"), None);
        assert_eq!(errors.get("otro"), Some(INVALID_EMAIL));
    }

    #[test]
    fn optional_text_drops_blanks() {
        assert_eq!(optional_text("  "), None);
        assert_eq!(optional_text(" Calle 1 "), Some("Calle 1"));
    }
}
