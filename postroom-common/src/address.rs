use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a sender or recipient address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The input was empty or whitespace only.
    #[error("Empty address")]
    Empty,

    /// The address part is not of the `local@domain` shape.
    #[error("Invalid address: {0}")]
    Invalid(String),
}

/// A single mail address with an optional display name.
///
/// Parses from both the bare form (`user@example.com`) and the named form
/// (`Jane Doe <user@example.com>`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Address {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The domain part of the address, if present.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

fn validate_email(email: &str) -> Result<(), AddressError> {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return Err(AddressError::Invalid(email.to_string()));
    };

    if local.is_empty() || domain.is_empty() || email.contains(char::is_whitespace) {
        return Err(AddressError::Invalid(email.to_string()));
    }

    Ok(())
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        if let Some(open) = s.find('<') {
            let Some(email) = s[open + 1..].strip_suffix('>') else {
                return Err(AddressError::Invalid(s.to_string()));
            };

            validate_email(email)?;

            let name = s[..open].trim().trim_matches('"').trim();
            let address = Self::new(email);

            return Ok(if name.is_empty() {
                address
            } else {
                address.with_name(name)
            });
        }

        validate_email(s)?;
        Ok(Self::new(s))
    }
}
