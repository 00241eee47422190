use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

fn validate_role_name(value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(Error::InvalidRole("role must not be empty".to_string()));
    }
    Ok(value.to_string())
}

/// Role identifier, the unit of authorization.
///
/// Any non-empty string is a role, taken verbatim: OAuth scopes such as
/// `https://api/read` or `read users` are valid. Roles from a decoded identity
/// claim go through [`Role::from_string`] and simply fail membership checks
/// when they are not part of the table.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Creates a role; only the empty string is rejected.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        validate_role_name(value.as_ref()).map(Self)
    }

    /// Creates a role from a trusted string without validation.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Role {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Role {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

/// HTTP methods that can carry a permission.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// Canonical scan order used by the compiler.
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
    ];

    /// Upper-case method name.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        HttpMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| Error::InvalidMethod(value.to_string()))
    }
}

impl TryFrom<&str> for HttpMethod {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}

/// The set of roles a table knows about.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RoleDomain {
    /// Every role observed in the document, in order of first appearance.
    Closed(Vec<Role>),
    /// The document declared no roles; any string is a role.
    Open,
}

impl RoleDomain {
    pub(crate) fn from_roles(roles: Vec<Role>) -> Self {
        if roles.is_empty() {
            RoleDomain::Open
        } else {
            RoleDomain::Closed(roles)
        }
    }

    /// Roles of a closed domain; empty for an open one.
    pub fn roles(&self) -> &[Role] {
        match self {
            RoleDomain::Closed(roles) => roles,
            RoleDomain::Open => &[],
        }
    }

    /// Returns true when the domain admits arbitrary role strings.
    pub fn is_open(&self) -> bool {
        matches!(self, RoleDomain::Open)
    }

    /// Returns true when `role` belongs to the domain.
    pub fn contains(&self, role: &str) -> bool {
        match self {
            RoleDomain::Closed(roles) => roles.iter().any(|known| known.as_str() == role),
            RoleDomain::Open => true,
        }
    }

    /// Resolves a raw string into a role of this domain.
    pub fn parse(&self, value: &str) -> Option<Role> {
        self.contains(value)
            .then(|| Role::from_string(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_new_keeps_text_verbatim() {
        assert_eq!(Role::new(" admin ").unwrap().as_str(), " admin ");
        assert_eq!(Role::new("read users").unwrap().as_str(), "read users");
        assert_eq!(
            Role::new("https://api/read").unwrap().as_str(),
            "https://api/read"
        );
        assert_eq!(Role::new("x".repeat(300)).unwrap().as_str().len(), 300);
        assert!(matches!(Role::new(""), Err(Error::InvalidRole(_))));
    }

    #[test]
    fn http_method_parses_case_insensitively() {
        assert_eq!("delete".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert_eq!(HttpMethod::try_from("PATCH").unwrap(), HttpMethod::Patch);
        assert!(matches!(
            "HEAD".parse::<HttpMethod>(),
            Err(Error::InvalidMethod(_))
        ));
    }

    #[test]
    fn http_method_serializes_upper_case() {
        let json = serde_json::to_string(&HttpMethod::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
    }

    #[test]
    fn open_domain_accepts_any_role() {
        let domain = RoleDomain::from_roles(Vec::new());
        assert!(domain.is_open());
        assert_eq!(domain.parse("anyone").unwrap().as_str(), "anyone");
    }

    #[test]
    fn closed_domain_rejects_unknown_role() {
        let domain = RoleDomain::from_roles(vec![Role::new("admin").unwrap()]);
        assert!(domain.parse("admin").is_some());
        assert!(domain.parse("guest").is_none());
    }
}
