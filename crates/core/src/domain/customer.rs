use serde::{Deserialize, Serialize};

/// Customer code in the external registry (a business partner `CardCode`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CustomerCode(pub String);

impl CustomerCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub code: CustomerCode,
    pub name: String,
    pub email: Option<String>,
    pub price_tier: Option<String>,
}

impl Customer {
    pub fn email_domain(&self) -> Option<String> {
        self.email.as_deref().and_then(email_domain)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerCandidate {
    pub external_code: CustomerCode,
    pub display_name: String,
    pub score: u8,
    pub match_reason: String,
    #[serde(default)]
    pub price_tier: Option<String>,
}

/// Lowercased domain part of an address, `None` for malformed input.
pub fn email_domain(address: &str) -> Option<String> {
    let (_, domain) = address.trim().rsplit_once('@')?;
    let domain = domain.trim().trim_end_matches('>').to_ascii_lowercase();
    if domain.is_empty() || !domain.contains('.') {
        return None;
    }
    Some(domain)
}

#[cfg(test)]
mod tests {
    use super::email_domain;

    #[test]
    fn email_domain_handles_display_form_and_case() {
        assert_eq!(email_domain("Achats <achats@Edge-Comm.FR>"), Some("edge-comm.fr".to_string()));
        assert_eq!(email_domain("no-at-sign"), None);
        assert_eq!(email_domain("user@localhost"), None);
    }
}
