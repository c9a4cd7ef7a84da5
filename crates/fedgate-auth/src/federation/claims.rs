//! Claims returned by an external provider and the result of a callback.

use serde::{Deserialize, Serialize};

/// Well-known claim types read by the login orchestrator.
pub mod claim_types {
    /// OIDC subject.
    pub const SUBJECT: &str = "sub";
    /// Email address.
    pub const EMAIL: &str = "email";
    /// Whether the provider verified the email address.
    pub const EMAIL_VERIFIED: &str = "email_verified";
    /// Phone number.
    pub const PHONE_NUMBER: &str = "phone_number";
    /// Whether the provider verified the phone number.
    pub const PHONE_NUMBER_VERIFIED: &str = "phone_number_verified";
    /// Full display name.
    pub const NAME: &str = "name";
    /// Preferred username as chosen at the provider.
    pub const PREFERRED_USERNAME: &str = "preferred_username";
    /// Nonce echoed back in the ID token.
    pub const NONCE: &str = "nonce";
}

/// A single claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type, e.g. `email`.
    pub claim_type: String,
    /// String value of the claim.
    pub value: String,
}

/// An ordered collection of claims; a type may appear more than once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(Vec<Claim>);

impl ClaimSet {
    /// Creates an empty claim set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a claim.
    pub fn push(&mut self, claim_type: impl Into<String>, value: impl Into<String>) {
        self.0.push(Claim {
            claim_type: claim_type.into(),
            value: value.into(),
        });
    }

    /// Adds a claim, builder style.
    #[must_use]
    pub fn with(mut self, claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(claim_type, value);
        self
    }

    /// Builds a claim set from a decoded JSON object (ID token or userinfo).
    ///
    /// Strings are kept as-is, booleans and numbers are stringified, arrays
    /// become one claim per scalar element. Nulls and nested objects are dropped.
    #[must_use]
    pub fn from_json(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut claims = Self::new();
        for (claim_type, value) in object {
            match value {
                serde_json::Value::Array(items) => {
                    for item in items {
                        if let Some(v) = scalar_to_string(item) {
                            claims.push(claim_type.clone(), v);
                        }
                    }
                }
                other => {
                    if let Some(v) = scalar_to_string(other) {
                        claims.push(claim_type.clone(), v);
                    }
                }
            }
        }
        claims
    }

    /// First value of the given claim type.
    #[must_use]
    pub fn value(&self, claim_type: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// All values of the given claim type.
    pub fn values<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// First non-blank value among `claim_types`, in the given priority order.
    #[must_use]
    pub fn first_of<S: AsRef<str>>(&self, claim_types: &[S]) -> Option<&str> {
        claim_types.iter().find_map(|t| {
            self.value(t.as_ref())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
    }

    /// Reads a boolean flag claim. Absent or unparsable values are `false`.
    #[must_use]
    pub fn flag(&self, claim_type: &str) -> bool {
        self.value(claim_type)
            .and_then(|v| v.trim().to_ascii_lowercase().parse::<bool>().ok())
            .unwrap_or(false)
    }

    /// Number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no claims.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over all claims.
    pub fn iter(&self) -> impl Iterator<Item = &Claim> {
        self.0.iter()
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// What a protocol handler yields after a successful callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLoginResult {
    /// The scheme that produced the result.
    pub provider_name: String,

    /// Claims asserted by the provider.
    pub claims: ClaimSet,

    /// Local return URL captured at challenge time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

impl ExternalLoginResult {
    /// Creates a result for the given provider.
    #[must_use]
    pub fn new(provider_name: impl Into<String>, claims: ClaimSet) -> Self {
        Self {
            provider_name: provider_name.into(),
            claims,
            return_url: None,
        }
    }

    /// Sets the return URL.
    #[must_use]
    pub fn with_return_url(mut self, return_url: impl Into<String>) -> Self {
        self.return_url = Some(return_url.into());
        self
    }

    /// Extracts the external subject id: first present of `claim_types`.
    #[must_use]
    pub fn external_subject_id<S: AsRef<str>>(&self, claim_types: &[S]) -> Option<&str> {
        self.claims.first_of(claim_types)
    }

    /// Email with its verification flag, if the provider sent one.
    #[must_use]
    pub fn email(&self) -> Option<(&str, bool)> {
        self.claims
            .value(claim_types::EMAIL)
            .map(|e| (e, self.claims.flag(claim_types::EMAIL_VERIFIED)))
    }

    /// Phone number with its verification flag, if the provider sent one.
    #[must_use]
    pub fn phone_number(&self) -> Option<(&str, bool)> {
        self.claims
            .value(claim_types::PHONE_NUMBER)
            .map(|p| (p, self.claims.flag(claim_types::PHONE_NUMBER_VERIFIED)))
    }

    /// Display name: `name`, then `preferred_username`, then email.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.claims.first_of(&[
            claim_types::NAME,
            claim_types::PREFERRED_USERNAME,
            claim_types::EMAIL,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_of_priority() {
        let claims = ClaimSet::new().with("oid", "o-1").with("sub", "s-1");
        assert_eq!(claims.first_of(&["sub", "oid"]), Some("s-1"));
        assert_eq!(claims.first_of(&["nameid", "oid"]), Some("o-1"));
        assert_eq!(claims.first_of(&["nameid"]), None);
    }

    #[test]
    fn test_first_of_skips_blank_values() {
        let claims = ClaimSet::new().with("sub", "  ").with("oid", "o-1");
        assert_eq!(claims.first_of(&["sub", "oid"]), Some("o-1"));
    }

    #[test]
    fn test_flag_parsing() {
        let claims = ClaimSet::new()
            .with("a", "true")
            .with("b", "TRUE")
            .with("c", "yes")
            .with("d", "false");
        assert!(claims.flag("a"));
        assert!(claims.flag("b"));
        assert!(!claims.flag("c"));
        assert!(!claims.flag("d"));
        assert!(!claims.flag("missing"));
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({
            "sub": "ext-1",
            "email_verified": true,
            "updated_at": 1700000000,
            "groups": ["admin", "dev", {"nested": true}],
            "address": {"country": "NL"},
            "middle_name": null
        });
        let claims = ClaimSet::from_json(json.as_object().unwrap());
        assert_eq!(claims.value("sub"), Some("ext-1"));
        assert!(claims.flag("email_verified"));
        assert_eq!(claims.value("updated_at"), Some("1700000000"));
        assert_eq!(claims.values("groups").collect::<Vec<_>>(), vec!["admin", "dev"]);
        assert!(claims.value("address").is_none());
        assert!(claims.value("middle_name").is_none());
    }

    #[test]
    fn test_result_contact_data() {
        let result = ExternalLoginResult::new(
            "okta",
            ClaimSet::new()
                .with("sub", "ext-1")
                .with("email", "a@b.com")
                .with("email_verified", "true")
                .with("phone_number", "+15550100")
                .with("phone_number_verified", "not-a-bool"),
        );
        assert_eq!(result.email(), Some(("a@b.com", true)));
        assert_eq!(result.phone_number(), Some(("+15550100", false)));
        assert_eq!(result.display_name(), Some("a@b.com"));
        assert_eq!(result.external_subject_id(&["sub"]), Some("ext-1"));
    }
}
