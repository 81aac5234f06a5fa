//! Contact and admin email addresses.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Why an address was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email is required")]
    Blank,
    #[error("email is longer than {0} characters")]
    TooLong(usize),
    #[error("email must not contain spaces")]
    ContainsWhitespace,
    #[error("email must have exactly one @")]
    AtCount,
    #[error("email needs a name before the @")]
    MissingMailbox,
    #[error("email domain must look like example.org")]
    BadDomain,
}

/// An email address as typed into a prayer or sign-in form.
///
/// Accepts `name@host.tld`: no whitespace, a single `@`, and a domain with
/// at least one dot that neither starts nor ends the domain. Surrounding
/// whitespace is dropped; case is preserved, use
/// [`normalized`](Self::normalized) for comparisons.
///
/// Rows read back from the backend are not re-validated.
///
/// ```
/// use prayerline_core::Email;
///
/// assert!(Email::parse(" Ann.Lee+prayer@church.org ").is_ok());
/// assert!(Email::parse("ann@localhost").is_err());
/// assert!(Email::parse("ann lee@church.org").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Longest accepted address.
    pub const MAX_LENGTH: usize = 254;

    /// # Errors
    ///
    /// Returns the first rule the trimmed input breaks.
    pub fn parse(input: &str) -> Result<Self, EmailError> {
        let address = input.trim();
        if address.is_empty() {
            return Err(EmailError::Blank);
        }
        if address.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong(Self::MAX_LENGTH));
        }
        if address.chars().any(char::is_whitespace) {
            return Err(EmailError::ContainsWhitespace);
        }

        let mut parts = address.split('@');
        let (Some(mailbox), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(EmailError::AtCount);
        };
        if mailbox.is_empty() {
            return Err(EmailError::MissingMailbox);
        }
        if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
            return Err(EmailError::BadDomain);
        }

        Ok(Self(address.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form used for admin and subscriber lookups.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_addresses() {
        for ok in [
            "ann@church.org",
            "ann.lee+prayer@mail.church.org",
            "a@b.co",
            "  padded@church.org\n",
        ] {
            assert!(Email::parse(ok).is_ok(), "{ok} should parse");
        }
    }

    #[test]
    fn test_rejections() {
        let cases = [
            ("", EmailError::Blank),
            ("   ", EmailError::Blank),
            ("ann lee@church.org", EmailError::ContainsWhitespace),
            ("ann.church.org", EmailError::AtCount),
            ("ann@@church.org", EmailError::AtCount),
            ("@church.org", EmailError::MissingMailbox),
            ("ann@localhost", EmailError::BadDomain),
            ("ann@.church", EmailError::BadDomain),
            ("ann@church.", EmailError::BadDomain),
            ("ann@", EmailError::BadDomain),
        ];
        for (input, expected) in cases {
            assert_eq!(Email::parse(input).unwrap_err(), expected, "input {input:?}");
        }
    }

    #[test]
    fn test_too_long() {
        let long = format!("{}@church.org", "a".repeat(250));
        assert_eq!(
            Email::parse(&long).unwrap_err(),
            EmailError::TooLong(Email::MAX_LENGTH)
        );
    }

    #[test]
    fn test_trims_but_keeps_case() {
        let email = Email::parse("  Pastor.John@Church.ORG ").unwrap();
        assert_eq!(email.as_str(), "Pastor.John@Church.ORG");
        assert_eq!(email.normalized(), "pastor.john@church.org");
        assert_eq!(email.to_string(), "Pastor.John@Church.ORG");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let email: Email = "ann@church.org".parse().unwrap();
        assert_eq!(serde_json::to_value(&email).unwrap(), "ann@church.org");
    }
}
