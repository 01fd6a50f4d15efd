//! Service Provider registration records and their lookup store

use crate::config::{seconds, SamlIdpOptions};
use crate::saml::constants::bindings;
use crate::session::StoreError;
use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Which parts of an outbound Response carry an XML signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningBehavior {
    DoNotSign,
    SignResponse,
    SignAssertion,
    SignBoth,
}

impl SigningBehavior {
    pub fn signs_assertion(self) -> bool {
        matches!(self, SigningBehavior::SignAssertion | SigningBehavior::SignBoth)
    }

    pub fn signs_response(self) -> bool {
        matches!(self, SigningBehavior::SignResponse | SigningBehavior::SignBoth)
    }
}

/// HTTP binding used to deliver a message to an SP endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamlBinding {
    HttpRedirect,
    HttpPost,
}

impl SamlBinding {
    pub fn uri(self) -> &'static str {
        match self {
            SamlBinding::HttpRedirect => bindings::HTTP_REDIRECT,
            SamlBinding::HttpPost => bindings::HTTP_POST,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            bindings::HTTP_REDIRECT => Some(SamlBinding::HttpRedirect),
            bindings::HTTP_POST => Some(SamlBinding::HttpPost),
            _ => None,
        }
    }
}

/// SP single logout endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleLogoutService {
    pub location: String,
    pub binding: SamlBinding,
}

/// A registered relying party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceProvider {
    pub entity_id: String,

    #[serde(default)]
    pub display_name: Option<String>,

    /// Index-addressable; the first entry is the default ACS
    #[serde(default)]
    pub assertion_consumer_service_urls: Vec<String>,

    #[serde(default)]
    pub single_logout_service: Option<SingleLogoutService>,

    /// Trust anchors for requests signed by the SP (PEM or base64 DER)
    #[serde(default)]
    pub signing_certificates: Vec<String>,

    /// Certificates used to encrypt assertions for the SP (PEM or base64 DER)
    #[serde(default)]
    pub encryption_certificates: Vec<String>,

    #[serde(default)]
    pub signing_behavior: Option<SigningBehavior>,

    #[serde(default)]
    pub require_signed_authn_requests: bool,

    #[serde(default)]
    pub allow_idp_initiated: bool,

    #[serde(default)]
    pub request_max_age_secs: Option<u64>,

    #[serde(default)]
    pub clock_skew_secs: Option<u64>,

    #[serde(default)]
    pub default_name_id_format: Option<String>,

    #[serde(default)]
    pub default_persistent_name_identifier_claim_type: Option<String>,

    /// Claim type -> attribute name; entries win over the global defaults
    #[serde(default)]
    pub claim_mappings: BTreeMap<String, String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub require_consent: bool,
}

fn default_true() -> bool {
    true
}

impl ServiceProvider {
    /// Minimal enabled SP with a single ACS URL
    pub fn new(entity_id: impl Into<String>, acs_url: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            display_name: None,
            assertion_consumer_service_urls: vec![acs_url.into()],
            single_logout_service: None,
            signing_certificates: Vec::new(),
            encryption_certificates: Vec::new(),
            signing_behavior: None,
            require_signed_authn_requests: false,
            allow_idp_initiated: false,
            request_max_age_secs: None,
            clock_skew_secs: None,
            default_name_id_format: None,
            default_persistent_name_identifier_claim_type: None,
            claim_mappings: BTreeMap::new(),
            enabled: true,
            require_consent: false,
        }
    }

    /// Absent behavior resolves to signing the assertion
    pub fn effective_signing_behavior(&self) -> SigningBehavior {
        self.signing_behavior.unwrap_or(SigningBehavior::SignAssertion)
    }

    pub fn request_max_age(&self, options: &SamlIdpOptions) -> Duration {
        self.request_max_age_secs
            .map_or_else(|| options.default_request_max_age(), seconds)
    }

    pub fn clock_skew(&self, options: &SamlIdpOptions) -> Duration {
        self.clock_skew_secs
            .map_or_else(|| options.default_clock_skew(), seconds)
    }

    pub fn default_acs_url(&self) -> Option<&str> {
        self.assertion_consumer_service_urls
            .first()
            .map(String::as_str)
    }

    pub fn encrypts_assertions(&self) -> bool {
        !self.encryption_certificates.is_empty()
    }

    /// SP requires signed requests on its own, or the IdP demands it globally
    pub fn requires_signed_requests(&self, options: &SamlIdpOptions) -> bool {
        self.require_signed_authn_requests || options.want_authn_requests_signed
    }
}

/// Lookup of registered Service Providers by EntityID
#[async_trait]
pub trait ServiceProviderStore: Send + Sync {
    /// Find an SP regardless of its enabled flag
    async fn find_by_entity_id(&self, entity_id: &str)
        -> Result<Option<ServiceProvider>, StoreError>;

    /// Find an SP that is enabled
    async fn find_enabled(&self, entity_id: &str) -> Result<Option<ServiceProvider>, StoreError> {
        Ok(self
            .find_by_entity_id(entity_id)
            .await?
            .filter(|sp| sp.enabled))
    }
}

/// In-memory SP registry
#[derive(Debug, Default, Clone)]
pub struct InMemoryServiceProviderStore {
    providers: Arc<RwLock<HashMap<String, ServiceProvider>>>,
}

impl InMemoryServiceProviderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_providers(providers: impl IntoIterator<Item = ServiceProvider>) -> Self {
        let map = providers
            .into_iter()
            .map(|sp| (sp.entity_id.clone(), sp))
            .collect();
        Self {
            providers: Arc::new(RwLock::new(map)),
        }
    }

    /// Insert or replace a registration
    pub async fn upsert(&self, provider: ServiceProvider) {
        self.providers
            .write()
            .await
            .insert(provider.entity_id.clone(), provider);
    }

    pub async fn remove(&self, entity_id: &str) -> Option<ServiceProvider> {
        self.providers.write().await.remove(entity_id)
    }

    pub async fn len(&self) -> usize {
        self.providers.read().await.len()
    }
}

#[async_trait]
impl ServiceProviderStore for InMemoryServiceProviderStore {
    async fn find_by_entity_id(
        &self,
        entity_id: &str,
    ) -> Result<Option<ServiceProvider>, StoreError> {
        Ok(self.providers.read().await.get(entity_id).cloned())
    }
}
