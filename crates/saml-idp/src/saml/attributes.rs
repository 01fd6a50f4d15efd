//! Claims to SAML attribute mapping

use crate::config::SamlIdpOptions;
use crate::models::{Claim, ServiceProvider};
use serde::{Deserialize, Serialize};

/// A resolved SAML attribute ready for the assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlAttribute {
    pub name: String,
    pub name_format: String,
    pub friendly_name: Option<String>,
    /// Never empty
    pub values: Vec<String>,
}

/// Turns a principal's claims into attributes for one SP.
///
/// A registered mapper replaces the built-in resolution entirely.
pub trait AttributeMapper: Send + Sync {
    fn map(&self, claims: &[Claim], sp: &ServiceProvider) -> Vec<SamlAttribute>;
}

/// Layered mapping: SP `claim_mappings`, then the global defaults, else the claim
/// is dropped. Same-type claims collapse into one attribute.
#[derive(Debug, Clone)]
pub struct DefaultAttributeMapper {
    options: SamlIdpOptions,
}

impl DefaultAttributeMapper {
    pub fn new(options: SamlIdpOptions) -> Self {
        Self { options }
    }

    fn attribute_name<'a>(&'a self, claim_type: &str, sp: &'a ServiceProvider) -> Option<&'a str> {
        sp.claim_mappings
            .get(claim_type)
            .or_else(|| self.options.default_claim_mappings.get(claim_type))
            .map(String::as_str)
    }
}

impl AttributeMapper for DefaultAttributeMapper {
    fn map(&self, claims: &[Claim], sp: &ServiceProvider) -> Vec<SamlAttribute> {
        let mut attributes: Vec<SamlAttribute> = Vec::new();

        for claim in claims {
            let Some(name) = self.attribute_name(&claim.claim_type, sp) else {
                continue;
            };

            match attributes
                .iter_mut()
                .find(|a| a.friendly_name.as_deref() == Some(claim.claim_type.as_str()))
            {
                Some(existing) => existing.values.push(claim.value.clone()),
                None => attributes.push(SamlAttribute {
                    name: name.to_string(),
                    name_format: self.options.attribute_name_format.clone(),
                    friendly_name: Some(claim.claim_type.clone()),
                    values: vec![claim.value.clone()],
                }),
            }
        }

        attributes
    }
}
