//! U2F application id resolution
//!
//! A U2F request only carries SHA-256 of the application id. For a handful of
//! well known services the hash is mapped back to a readable relying party id
//! so the stored credential can later be used through WebAuthn as well.

use authorizer_crypto::sha256;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Relying party name stored with U2F registrations
pub const U2F_RP_NAME: &str = "U2F Server";

/// A known U2F facet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    /// WebAuthn relying party id
    pub rp_id: String,
    /// Legacy U2F application id whose hash the client sends
    pub app_id: String,
}

impl Facet {
    pub fn new(rp_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            rp_id: rp_id.into(),
            app_id: app_id.into(),
        }
    }
}

/// Table of application ids resolvable from their hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnownFacets {
    facets: Vec<Facet>,
}

impl Default for KnownFacets {
    fn default() -> Self {
        Self::new(vec![
            Facet::new("google.com", "https://www.gstatic.com/securitykey/origins.json"),
            Facet::new("github.com", "https://github.com/u2f/trusted_facets"),
            Facet::new("dropbox.com", "https://www.dropbox.com/u2f-app-id.json"),
            Facet::new("facebook.com", "https://www.facebook.com/u2f/app_id/"),
            Facet::new("gitlab.com", "https://gitlab.com"),
            Facet::new("bitbucket.org", "https://bitbucket.org"),
        ])
    }
}

impl KnownFacets {
    pub fn new(facets: Vec<Facet>) -> Self {
        Self { facets }
    }

    /// A table that resolves nothing
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn push(&mut self, facet: Facet) {
        self.facets.push(facet);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Facet> {
        self.facets.iter()
    }

    /// Find the facet whose application id hashes to `application`
    pub fn resolve(&self, application: &[u8]) -> Option<&Facet> {
        self.facets
            .iter()
            .find(|facet| sha256(facet.app_id.as_bytes())[..] == *application)
    }

    /// (rp id, legacy application id) to store for a registration
    ///
    /// Unknown hashes use their base64 encoding for both.
    pub fn rp_ids_for(&self, application: &[u8]) -> (String, String) {
        match self.resolve(application) {
            Some(facet) => (facet.rp_id.clone(), facet.app_id.clone()),
            None => {
                let encoded = STANDARD.encode(application);
                (encoded.clone(), encoded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_facet() {
        let facets = KnownFacets::default();
        let hash = sha256(b"https://github.com/u2f/trusted_facets");

        let (rp_id, app_id) = facets.rp_ids_for(&hash);
        assert_eq!(rp_id, "github.com");
        assert_eq!(app_id, "https://github.com/u2f/trusted_facets");
    }

    #[test]
    fn test_unknown_facet_uses_base64() {
        let facets = KnownFacets::default();
        let hash = sha256(b"https://unknown.example");

        let (rp_id, app_id) = facets.rp_ids_for(&hash);
        assert_eq!(rp_id, app_id);
        assert_eq!(STANDARD.decode(rp_id).unwrap(), hash);
    }

    #[test]
    fn test_custom_table() {
        let mut facets = KnownFacets::empty();
        assert!(facets.resolve(&sha256(b"https://gitlab.com")).is_none());

        facets.push(Facet::new("example.org", "https://example.org/app-id.json"));
        assert_eq!(
            facets
                .resolve(&sha256(b"https://example.org/app-id.json"))
                .map(|f| f.rp_id.as_str()),
            Some("example.org")
        );
    }
}
