//! IdP EntityDescriptor generation

use super::assertion_builder::format_instant;
use crate::config::SamlIdpOptions;
use crate::error::SamlResult;
use crate::saml::constants::{bindings, DSIG_NS, METADATA_NS, PROTOCOL_NS};
use crate::saml::SigningCredentials;
use crate::xml::XmlElement;
use chrono::{DateTime, Utc};

/// Generator for the IdP's own metadata document
pub struct MetadataGenerator<'a> {
    options: &'a SamlIdpOptions,
    credentials: Option<&'a SigningCredentials>,
}

impl<'a> MetadataGenerator<'a> {
    /// Without credentials the descriptor omits its signing KeyDescriptor
    #[must_use]
    pub fn new(options: &'a SamlIdpOptions, credentials: Option<&'a SigningCredentials>) -> Self {
        Self {
            options,
            credentials,
        }
    }

    pub fn generate(&self, now: DateTime<Utc>) -> SamlResult<String> {
        Ok(self.descriptor(now)?.to_document())
    }

    fn descriptor(&self, now: DateTime<Utc>) -> SamlResult<XmlElement> {
        let mut idp = XmlElement::new("md:IDPSSODescriptor")
            .with_attr(
                "WantAuthnRequestsSigned",
                self.options.want_authn_requests_signed.to_string(),
            )
            .with_attr("protocolSupportEnumeration", PROTOCOL_NS);

        if let Some(credentials) = self.credentials {
            idp.push_child(
                XmlElement::new("md:KeyDescriptor")
                    .with_attr("use", "signing")
                    .with_child(
                        XmlElement::new("ds:KeyInfo").with_child(
                            XmlElement::new("ds:X509Data").with_child(
                                XmlElement::new("ds:X509Certificate")
                                    .with_text(credentials.certificate_base64_der()?),
                            ),
                        ),
                    ),
            );
        }

        let logout_url = self.options.logout_url();
        for binding in [bindings::HTTP_REDIRECT, bindings::HTTP_POST] {
            idp.push_child(endpoint("md:SingleLogoutService", binding, &logout_url));
        }

        for format in &self.options.supported_name_id_formats {
            idp.push_child(XmlElement::new("md:NameIDFormat").with_text(format.as_str()));
        }

        let signin_url = self.options.signin_url();
        for binding in [bindings::HTTP_REDIRECT, bindings::HTTP_POST] {
            idp.push_child(endpoint("md:SingleSignOnService", binding, &signin_url));
        }

        Ok(XmlElement::new("md:EntityDescriptor")
            .with_attr("xmlns:md", METADATA_NS)
            .with_attr("xmlns:ds", DSIG_NS)
            .with_attr("entityID", self.options.entity_id.as_str())
            .with_attr(
                "validUntil",
                format_instant(now + self.options.metadata_validity()),
            )
            .with_child(idp))
    }
}

fn endpoint(name: &str, binding: &str, location: &str) -> XmlElement {
    XmlElement::new(name)
        .with_attr("Binding", binding)
        .with_attr("Location", location)
}
