//! Validated value types shared across the praxis workspace.
//!
//! Every constructor trims its input and returns a `Result`; once a value
//! exists it is known to be well-formed. Serde deserialization goes through
//! the same constructors, so persisted data is re-validated on the way in.

/// Errors that can occur when creating validated value types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("text cannot be empty")]
    Empty,
    /// The input was not shaped like an email address
    #[error("not a valid email address")]
    InvalidEmail,
    /// The input was not shaped like a phone number
    #[error("not a valid phone number")]
    InvalidPhone,
}

/// A string type that guarantees non-empty content.
///
/// Wraps a `String` and ensures it contains at least one non-whitespace
/// character. Input is trimmed of leading and trailing whitespace during
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the
    /// trimmed result is empty, `TextError::Empty` is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the inner `String`.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<NonEmptyText> for String {
    fn from(value: NonEmptyText) -> Self {
        value.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// An email address validated for basic structural shape.
///
/// This is deliberately conservative: one `@`, a non-empty local part, and a
/// domain containing an interior dot. Full RFC 5321 parsing belongs to the
/// delivery collaborator; this type only guards against obviously unusable
/// recipient values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parses the input as an email address.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` for blank input and
    /// `TextError::InvalidEmail` when the shape checks fail.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(TextError::InvalidEmail);
        }

        let mut parts = trimmed.splitn(2, '@');
        let local = parts.next().unwrap_or("");
        let domain = parts.next().ok_or(TextError::InvalidEmail)?;

        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(TextError::InvalidEmail);
        }
        if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
            return Err(TextError::InvalidEmail);
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for EmailAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for EmailAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EmailAddress::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A phone number validated for basic dialable shape.
///
/// Accepts an optional leading `+` and the usual separators (spaces, dashes,
/// parentheses); the digits themselves must number between 7 and 15. The
/// stored form is normalised to the leading `+` (if present) plus digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parses the input as a phone number, normalising separators away.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` for blank input and
    /// `TextError::InvalidPhone` when the digit count or characters are
    /// unacceptable.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }

        let mut normalised = String::with_capacity(trimmed.len());
        for (i, c) in trimmed.chars().enumerate() {
            match c {
                '+' if i == 0 => normalised.push('+'),
                '0'..='9' => normalised.push(c),
                ' ' | '-' | '(' | ')' => {}
                _ => return Err(TextError::InvalidPhone),
            }
        }

        let digits = normalised.chars().filter(char::is_ascii_digit).count();
        if !(7..=15).contains(&digits) {
            return Err(TextError::InvalidPhone);
        }

        Ok(Self(normalised))
    }

    /// Returns the normalised number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for PhoneNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PhoneNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PhoneNumber::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_and_accepts() {
        let text = NonEmptyText::new("  routine check-up  ").expect("should accept");
        assert_eq!(text.as_str(), "routine check-up");
    }

    #[test]
    fn non_empty_text_rejects_whitespace_only() {
        let err = NonEmptyText::new(" \t\n").expect_err("should reject");
        assert_eq!(err, TextError::Empty);
    }

    #[test]
    fn email_accepts_plain_address() {
        let email = EmailAddress::parse("ana.perez@example.com").expect("should accept");
        assert_eq!(email.as_str(), "ana.perez@example.com");
    }

    #[test]
    fn email_rejects_missing_at_and_bad_domain() {
        assert_eq!(
            EmailAddress::parse("not-an-email").expect_err("no @"),
            TextError::InvalidEmail
        );
        assert_eq!(
            EmailAddress::parse("a@b").expect_err("domain without dot"),
            TextError::InvalidEmail
        );
        assert_eq!(
            EmailAddress::parse("a@.com").expect_err("leading dot domain"),
            TextError::InvalidEmail
        );
        assert_eq!(
            EmailAddress::parse("a b@example.com").expect_err("inner whitespace"),
            TextError::InvalidEmail
        );
    }

    #[test]
    fn phone_normalises_separators() {
        let phone = PhoneNumber::parse("+58 (412) 555-0134").expect("should accept");
        assert_eq!(phone.as_str(), "+584125550134");
    }

    #[test]
    fn phone_rejects_short_and_alphabetic() {
        assert_eq!(
            PhoneNumber::parse("12345").expect_err("too short"),
            TextError::InvalidPhone
        );
        assert_eq!(
            PhoneNumber::parse("call-me-maybe").expect_err("letters"),
            TextError::InvalidPhone
        );
    }

    #[test]
    fn serde_round_trip_revalidates() {
        let email: EmailAddress = serde_json::from_str("\"dr@clinic.example\"")
            .expect("valid address should deserialize");
        assert_eq!(email.as_str(), "dr@clinic.example");

        let err = serde_json::from_str::<EmailAddress>("\"broken\"");
        assert!(err.is_err(), "invalid address must fail deserialization");
    }
}
