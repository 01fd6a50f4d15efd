//! NameID format selection and value resolution

use crate::config::SamlIdpOptions;
use crate::error::{SamlError, SamlResult};
use crate::models::{Principal, ServiceProvider};
use crate::saml::constants::{claim_types, nameid};
use uuid::Uuid;

/// The Subject's NameID as it will be emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNameId {
    pub value: String,
    pub format: String,
    pub sp_name_qualifier: Option<String>,
}

/// Requested format wins, then the SP default, then `unspecified`
pub fn select_format<'a>(requested: Option<&'a str>, sp: &'a ServiceProvider) -> &'a str {
    requested
        .filter(|f| !f.trim().is_empty())
        .or(sp.default_name_id_format.as_deref())
        .unwrap_or(nameid::UNSPECIFIED)
}

/// Claim type feeding persistent identifiers: SP setting, global setting, then the
/// standard name-identifier claim
pub fn persistent_claim_type<'a>(sp: &'a ServiceProvider, options: &'a SamlIdpOptions) -> &'a str {
    sp.default_persistent_name_identifier_claim_type
        .as_deref()
        .or(options.default_persistent_name_identifier_claim_type.as_deref())
        .unwrap_or(claim_types::NAME_IDENTIFIER)
}

/// Resolve the NameID for `principal`. Email and persistent formats never fall back
/// to another identifier; a missing source claim is an error.
pub fn resolve_name_id(
    requested_format: Option<&str>,
    principal: &Principal,
    sp: &ServiceProvider,
    options: &SamlIdpOptions,
) -> SamlResult<ResolvedNameId> {
    let format = select_format(requested_format, sp);

    let (value, sp_name_qualifier) = match format {
        nameid::EMAIL => {
            let email = principal
                .claim(claim_types::EMAIL)
                .or_else(|| principal.claim(claim_types::EMAIL_ADDRESS))
                .ok_or_else(|| SamlError::NameIdUnavailable {
                    format: format.to_string(),
                    detail: "principal has no email claim".to_string(),
                })?;
            (email.to_string(), None)
        }
        nameid::PERSISTENT => {
            let claim_type = persistent_claim_type(sp, options);
            let value = principal
                .claim(claim_type)
                .ok_or_else(|| SamlError::NameIdUnavailable {
                    format: format.to_string(),
                    detail: format!("principal has no '{claim_type}' claim"),
                })?;
            (value.to_string(), Some(sp.entity_id.clone()))
        }
        nameid::TRANSIENT => (format!("_{}", Uuid::new_v4()), None),
        _ => (principal.subject_id.clone(), None),
    };

    Ok(ResolvedNameId {
        value,
        format: format.to_string(),
        sp_name_qualifier,
    })
}
