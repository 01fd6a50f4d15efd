//! Business rules applied to a parsed AuthnRequest
//!
//! Checks return a [`SamlStatus`] when the failure is reportable to the SP as a
//! SAML error Response, and a [`SamlError`] when it is not (transport limits,
//! untrusted ACS targets, broken SP configuration).

use crate::config::SamlIdpOptions;
use crate::error::{SamlError, SamlResult};
use crate::models::{
    AuthnContextComparison, AuthnRequest, Principal, RequestedAuthnContext, SamlStatus,
    ServiceProvider, StatusCode,
};
use crate::saml::constants::{bindings, AUTHN_CONTEXT_UNSPECIFIED, SAML_VERSION};
use chrono::{DateTime, Utc};

/// How the principal must (re)authenticate before a Response can be issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthnDecision {
    /// The current session can be used as is
    UseExisting,
    /// Send the browser through the login step
    Authenticate,
}

/// Validator for the signin path
pub struct RequestValidator<'a> {
    options: &'a SamlIdpOptions,
    now: DateTime<Utc>,
}

impl<'a> RequestValidator<'a> {
    pub fn new(options: &'a SamlIdpOptions, now: DateTime<Utc>) -> Self {
        Self { options, now }
    }

    pub fn check_version(&self, request: &AuthnRequest) -> Result<(), SamlStatus> {
        if request.version == SAML_VERSION {
            Ok(())
        } else {
            tracing::warn!(version = %request.version, "Unsupported SAML version");
            Err(SamlStatus::version_mismatch())
        }
    }

    /// IssueInstant must lie within `[now - max_age, now + skew]`, both ends
    /// inclusive
    pub fn check_timing(
        &self,
        issue_instant: DateTime<Utc>,
        sp: &ServiceProvider,
    ) -> Result<(), SamlStatus> {
        if issue_instant > self.now + sp.clock_skew(self.options) {
            tracing::warn!(
                sp = %sp.entity_id,
                issue_instant = %issue_instant,
                now = %self.now,
                "Request issued in the future"
            );
            return Err(SamlStatus::requester("IssueInstant is in the future"));
        }
        if self.now > issue_instant + sp.request_max_age(self.options) {
            tracing::warn!(
                sp = %sp.entity_id,
                issue_instant = %issue_instant,
                now = %self.now,
                "Request expired"
            );
            return Err(SamlStatus::requester("Request has expired"));
        }
        Ok(())
    }

    /// A present Destination must name `expected` exactly
    pub fn check_destination(
        &self,
        destination: Option<&str>,
        expected: &str,
    ) -> Result<(), SamlStatus> {
        match destination {
            Some(destination) if destination != expected => {
                tracing::warn!(destination = %destination, expected = %expected, "Destination mismatch");
                Err(SamlStatus::requester("Invalid destination"))
            }
            _ => Ok(()),
        }
    }

    /// Explicit URL over index over the SP default. Returns the registered URL.
    pub fn resolve_acs(&self, request: &AuthnRequest, sp: &ServiceProvider) -> SamlResult<String> {
        if sp.assertion_consumer_service_urls.is_empty() {
            return Err(SamlError::ServiceProviderMisconfigured {
                entity_id: sp.entity_id.clone(),
                detail: "no AssertionConsumerService URLs registered".to_string(),
            });
        }

        if let Some(requested) = &request.assertion_consumer_service_url {
            return match_registered_acs(requested, &sp.assertion_consumer_service_urls)
                .map(String::from)
                .ok_or_else(|| {
                    tracing::warn!(sp = %sp.entity_id, acs = %requested, "Unregistered ACS URL");
                    SamlError::AcsUrlMismatch {
                        actual: requested.clone(),
                    }
                });
        }

        if let Some(index) = request.assertion_consumer_service_index {
            return usize::try_from(index)
                .ok()
                .and_then(|i| sp.assertion_consumer_service_urls.get(i))
                .cloned()
                .ok_or(SamlError::InvalidAcsIndex(index));
        }

        sp.default_acs_url()
            .map(String::from)
            .ok_or_else(|| SamlError::Internal("ACS list emptied during resolution".to_string()))
    }

    /// Responses are only delivered over HTTP-POST
    pub fn check_protocol_binding(&self, request: &AuthnRequest) -> Result<(), SamlStatus> {
        match request.protocol_binding.as_deref() {
            None | Some(bindings::HTTP_POST) => Ok(()),
            Some(other) => {
                tracing::warn!(binding = %other, "Unsupported ProtocolBinding requested");
                Err(SamlStatus::requester("Unsupported protocol binding")
                    .with_sub_code(StatusCode::UnsupportedBinding))
            }
        }
    }

    pub fn check_name_id_policy(&self, request: &AuthnRequest) -> Result<(), SamlStatus> {
        match request.requested_name_id_format() {
            Some(format) if !self.options.supports_name_id_format(format) => {
                tracing::warn!(format = %format, "Unsupported NameID format requested");
                Err(SamlStatus::responder("Unsupported NameID format")
                    .with_sub_code(StatusCode::InvalidNameIdPolicy))
            }
            _ => Ok(()),
        }
    }

    pub fn check_relay_state(&self, relay_state: Option<&str>) -> SamlResult<()> {
        match relay_state {
            Some(rs) if rs.len() > self.options.max_relay_state_length => {
                tracing::warn!(
                    length = rs.len(),
                    limit = self.options.max_relay_state_length,
                    "RelayState too long"
                );
                Err(SamlError::RelayStateTooLong)
            }
            _ => Ok(()),
        }
    }
}

/// IsPassive / ForceAuthn semantics against the current authentication state
pub fn authentication_decision(
    request: &AuthnRequest,
    authenticated: bool,
) -> Result<AuthnDecision, SamlStatus> {
    match (request.is_passive, request.force_authn, authenticated) {
        (true, _, false) => Err(no_passive(
            "user not currently logged in and passive login was requested",
        )),
        // Re-authentication would need interaction, which passive forbids
        (true, true, true) => Err(no_passive("user is not currently logged in")),
        (_, true, _) | (_, _, false) => Ok(AuthnDecision::Authenticate),
        _ => Ok(AuthnDecision::UseExisting),
    }
}

fn no_passive(message: &str) -> SamlStatus {
    SamlStatus::responder(message).with_sub_code(StatusCode::NoPassive)
}

/// Success, downgraded with a NoAuthnContext sub-status when the requested
/// context was not met
pub fn context_status(requested: Option<&RequestedAuthnContext>, satisfied: bool) -> SamlStatus {
    if requested.is_some() && !satisfied {
        SamlStatus::success().with_sub_code(StatusCode::NoAuthnContext)
    } else {
        SamlStatus::success()
    }
}

/// The class ref reported in the AuthnStatement
pub fn effective_class_ref(principal: &Principal) -> &str {
    principal
        .authn_context_class_ref
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(AUTHN_CONTEXT_UNSPECIFIED)
}

/// Decides whether a principal's authentication meets a RequestedAuthnContext
pub trait AuthnContextEvaluator: Send + Sync {
    fn is_satisfied(&self, requested: &RequestedAuthnContext, principal: &Principal) -> bool;
}

/// Compares class refs by position in a strength ranking, weakest first.
/// Class refs outside the ranking only satisfy `exact`.
#[derive(Debug, Clone)]
pub struct RankedAuthnContextEvaluator {
    ranking: Vec<String>,
}

impl RankedAuthnContextEvaluator {
    pub fn new(ranking: Vec<String>) -> Self {
        Self { ranking }
    }

    fn rank(&self, class_ref: &str) -> Option<usize> {
        self.ranking.iter().position(|r| r == class_ref)
    }
}

impl Default for RankedAuthnContextEvaluator {
    fn default() -> Self {
        Self::new(
            [
                AUTHN_CONTEXT_UNSPECIFIED,
                "urn:oasis:names:tc:SAML:2.0:ac:classes:Password",
                "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport",
                "urn:oasis:names:tc:SAML:2.0:ac:classes:X509",
                "urn:oasis:names:tc:SAML:2.0:ac:classes:Smartcard",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
    }
}

impl AuthnContextEvaluator for RankedAuthnContextEvaluator {
    fn is_satisfied(&self, requested: &RequestedAuthnContext, principal: &Principal) -> bool {
        let actual = effective_class_ref(principal);
        if requested.comparison == AuthnContextComparison::Exact {
            return requested.class_refs.iter().any(|c| c == actual);
        }

        let Some(actual_rank) = self.rank(actual) else {
            return false;
        };
        requested
            .class_refs
            .iter()
            .filter_map(|c| self.rank(c))
            .any(|wanted| match requested.comparison {
                AuthnContextComparison::Minimum => actual_rank >= wanted,
                AuthnContextComparison::Better => actual_rank > wanted,
                AuthnContextComparison::Maximum => actual_rank <= wanted,
                AuthnContextComparison::Exact => actual_rank == wanted,
            })
    }
}

/// Registered URL equal to `requested` after normalizing scheme and host case
/// and a trailing path slash
fn match_registered_acs<'a>(requested: &str, registered: &'a [String]) -> Option<&'a str> {
    let wanted = normalize_url(requested)?;
    registered
        .iter()
        .find(|url| normalize_url(url).as_deref() == Some(wanted.as_str()))
        .map(String::as_str)
}

fn normalize_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let mut normalized = format!(
        "{}://{}",
        parsed.scheme(),
        parsed.host_str().unwrap_or_default().to_ascii_lowercase()
    );
    if let Some(port) = parsed.port() {
        normalized.push_str(&format!(":{port}"));
    }
    normalized.push_str(parsed.path().trim_end_matches('/'));
    if let Some(query) = parsed.query() {
        normalized.push('?');
        normalized.push_str(query);
    }
    Some(normalized)
}
