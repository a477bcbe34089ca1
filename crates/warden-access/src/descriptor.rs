//! Resource descriptors.
//!
//! A descriptor is `type:attribute:value`, where the value is the wildcard
//! `*`, a literal identifier, or a `{param}` placeholder naming an argument of
//! the guarded operation. Compound descriptors join several with `&`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{AccessError, AccessResult, WILDCARD};

/// Value part of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueToken {
    /// Every existing instance.
    Wildcard,
    /// One concrete identifier.
    Literal(String),
    /// Caller-supplied argument.
    Placeholder(String),
}

impl fmt::Display for ValueToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => write!(f, "{}", WILDCARD),
            Self::Literal(value) => write!(f, "{}", value),
            Self::Placeholder(name) => write!(f, "{{{}}}", name),
        }
    }
}

/// Parsed `type:attribute:value` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceDescriptor {
    resource_type: String,
    attribute: String,
    value: ValueToken,
}

impl ResourceDescriptor {
    /// Parses a single descriptor.
    pub fn parse(raw: &str) -> AccessResult<Self> {
        let invalid = || AccessError::InvalidDescriptor(raw.to_string());

        let mut parts = raw.splitn(3, ':');
        let resource_type = parts.next().filter(|t| is_name_token(t)).ok_or_else(invalid)?;
        let attribute = parts.next().filter(|a| is_name_token(a)).ok_or_else(invalid)?;
        let value = parts.next().filter(|v| !v.is_empty()).ok_or_else(invalid)?;

        let value = if value == WILDCARD {
            ValueToken::Wildcard
        } else if let Some(inner) = value.strip_prefix('{') {
            let name = inner
                .strip_suffix('}')
                .filter(|n| is_parameter_name(n))
                .ok_or_else(invalid)?;
            ValueToken::Placeholder(name.to_string())
        } else if value.contains(['{', '}', '&']) {
            return Err(invalid());
        } else {
            ValueToken::Literal(value.to_string())
        };

        if resource_type == WILDCARD && (attribute != WILDCARD || value != ValueToken::Wildcard) {
            return Err(invalid());
        }

        Ok(Self {
            resource_type: resource_type.to_string(),
            attribute: attribute.to_string(),
            value,
        })
    }

    /// Parses a compound `a&b` descriptor, keeping declaration order.
    pub fn parse_compound(raw: &str) -> AccessResult<Vec<Self>> {
        raw.split('&').map(Self::parse).collect()
    }

    /// The descriptor covering any resource.
    #[must_use]
    pub fn any() -> Self {
        Self {
            resource_type: WILDCARD.to_string(),
            attribute: WILDCARD.to_string(),
            value: ValueToken::Wildcard,
        }
    }

    /// Creates a literal descriptor.
    pub fn literal(
        resource_type: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            attribute: attribute.into(),
            value: ValueToken::Literal(value.into()),
        }
    }

    /// Returns true for `*:*:*`.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.resource_type == WILDCARD
    }

    /// Resource type.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Attribute.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Value token.
    #[must_use]
    pub fn value(&self) -> &ValueToken {
        &self.value
    }

    /// Placeholder name, if the value is one.
    #[must_use]
    pub fn placeholder(&self) -> Option<&str> {
        match &self.value {
            ValueToken::Placeholder(name) => Some(name),
            _ => None,
        }
    }

    /// `type:attribute`, the namespace identifiers are compared in.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource_type, self.attribute)
    }
}

fn is_name_token(token: &str) -> bool {
    token == WILDCARD
        || (!token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
}

fn is_parameter_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.resource_type, self.attribute, self.value)
    }
}

impl FromStr for ResourceDescriptor {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceDescriptor {
    type Error = AccessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourceDescriptor> for String {
    fn from(descriptor: ResourceDescriptor) -> Self {
        descriptor.to_string()
    }
}
