//! SAML LogoutRequest and LogoutResponse builder

use super::assertion_builder::{format_instant, generate_id, issuer_element, status_element};
use super::message_signer::MessageSigner;
use crate::bindings::{post, redirect, OutboundMessage};
use crate::error::{SamlError, SamlResult};
use crate::models::{SamlBinding, SamlStatus};
use crate::saml::constants::{ASSERTION_NS, PROTOCOL_NS, SAML_VERSION};
use crate::saml::SigningCredentials;
use crate::session::SpSession;
use crate::xml::XmlElement;
use chrono::{DateTime, Utc};

/// Builder for signed logout messages. Logout messages are always signed.
pub struct SloBuilder<'a> {
    idp_entity_id: &'a str,
    credentials: &'a SigningCredentials,
    now: DateTime<Utc>,
}

impl<'a> SloBuilder<'a> {
    #[must_use]
    pub fn new(
        idp_entity_id: &'a str,
        credentials: &'a SigningCredentials,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            idp_entity_id,
            credentials,
            now,
        }
    }

    /// LogoutRequest telling an SP to end the session recorded in `session`
    pub fn logout_request(&self, destination: &str, session: &SpSession) -> XmlElement {
        let name_id = XmlElement::new("saml:NameID")
            .with_attr("Format", session.name_id_format.as_str())
            .with_optional_attr("SPNameQualifier", session.sp_name_qualifier.as_deref())
            .with_text(session.name_id.as_str());

        protocol_root("samlp:LogoutRequest", "lr", self.now, destination)
            .with_child(issuer_element(self.idp_entity_id))
            .with_child(name_id)
            .with_child(
                XmlElement::new("samlp:SessionIndex").with_text(session.session_index.as_str()),
            )
    }

    pub fn logout_response(
        &self,
        destination: &str,
        in_response_to: Option<&str>,
        status: &SamlStatus,
    ) -> XmlElement {
        protocol_root("samlp:LogoutResponse", "lresp", self.now, destination)
            .with_optional_attr("InResponseTo", in_response_to)
            .with_child(issuer_element(self.idp_entity_id))
            .with_child(status_element(status))
    }

    /// Sign `message` and encode it for `binding`. Redirect messages carry a
    /// query signature, POST messages an enveloped one.
    pub fn package(
        &self,
        mut message: XmlElement,
        binding: SamlBinding,
        destination: &str,
        parameter: &'static str,
        relay_state: Option<&str>,
    ) -> SamlResult<OutboundMessage> {
        match binding {
            SamlBinding::HttpRedirect => {
                let query = redirect::build_signed_query(
                    parameter,
                    &message.to_xml(),
                    relay_state,
                    self.credentials,
                )?;
                Ok(OutboundMessage::Redirect {
                    location: redirect::append_query(destination, &query),
                })
            }
            SamlBinding::HttpPost => {
                let id = message
                    .attr("ID")
                    .map(String::from)
                    .ok_or_else(|| SamlError::Internal("logout message has no ID".to_string()))?;
                MessageSigner::new(self.credentials).sign_element(&mut message, &id)?;
                Ok(OutboundMessage::post(
                    destination,
                    parameter,
                    post::encode_message(&message.to_document()),
                    relay_state.map(String::from),
                ))
            }
        }
    }
}

fn protocol_root(name: &str, kind: &str, now: DateTime<Utc>, destination: &str) -> XmlElement {
    XmlElement::new(name)
        .with_attr("xmlns:samlp", PROTOCOL_NS)
        .with_attr("xmlns:saml", ASSERTION_NS)
        .with_attr("ID", generate_id(kind))
        .with_attr("Version", SAML_VERSION)
        .with_attr("IssueInstant", format_instant(now))
        .with_attr("Destination", destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{SAML_REQUEST, SAML_RESPONSE};
    use crate::error::MessageKind;
    use crate::saml::constants::{nameid, status};
    use crate::services::signature_validator::SignatureValidator;
    use crate::test_support::test_credentials;
    use crate::xml::SecureXmlLoader;
    use uuid::Uuid;

    fn session() -> SpSession {
        SpSession {
            id: Uuid::new_v4(),
            subject_id: "user-1".to_string(),
            session_id: "sess-1".to_string(),
            sp_entity_id: "https://sp".to_string(),
            session_index: "sess-1".to_string(),
            name_id: "opaque-42".to_string(),
            name_id_format: nameid::PERSISTENT.to_string(),
            sp_name_qualifier: Some("https://sp".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_logout_request_shape() {
        let creds = test_credentials();
        let request = SloBuilder::new("https://idp", &creds, Utc::now())
            .logout_request("https://sp/slo", &session());

        assert_eq!(request.local_name(), "LogoutRequest");
        assert!(request.attr("ID").unwrap().starts_with("_lr_"));
        assert_eq!(request.attr("Destination"), Some("https://sp/slo"));
        let name_id = request.child("NameID").unwrap();
        assert_eq!(name_id.text(), "opaque-42");
        assert_eq!(name_id.attr("Format"), Some(nameid::PERSISTENT));
        assert_eq!(name_id.attr("SPNameQualifier"), Some("https://sp"));
        assert_eq!(request.child("SessionIndex").unwrap().text(), "sess-1");
    }

    #[test]
    fn test_redirect_package_decodes_to_request() {
        let creds = test_credentials();
        let builder = SloBuilder::new("https://idp", &creds, Utc::now());
        let message = builder.logout_request("https://sp/slo?x=1", &session());
        let expected = message.to_xml();

        let outbound = builder
            .package(message, SamlBinding::HttpRedirect, "https://sp/slo?x=1", SAML_REQUEST, Some("rs"))
            .unwrap();
        let OutboundMessage::Redirect { location } = outbound else {
            panic!("expected redirect");
        };
        assert!(location.starts_with("https://sp/slo?x=1&SAMLRequest="));

        let raw_query = location.split_once("x=1&").unwrap().1;
        let query = redirect::RedirectQuery::parse(raw_query, SAML_REQUEST);
        let decoded =
            redirect::decode_message(query.message_value().unwrap(), MessageKind::LogoutRequest)
                .unwrap();
        assert_eq!(decoded, expected);
        assert_eq!(query.relay_state_value(), Some("rs"));

        let keys = vec![creds.certificate().public_key().unwrap()];
        assert_eq!(SignatureValidator::validate_redirect(&query, &keys), Ok(()));
    }

    #[test]
    fn test_post_package_is_enveloped_signed() {
        let creds = test_credentials();
        let builder = SloBuilder::new("https://idp", &creds, Utc::now());
        let message =
            builder.logout_response("https://sp/slo", Some("_req"), &SamlStatus::success());

        let outbound = builder
            .package(message, SamlBinding::HttpPost, "https://sp/slo", SAML_RESPONSE, None)
            .unwrap();
        let OutboundMessage::Post { action, value, .. } = outbound else {
            panic!("expected post");
        };
        assert_eq!(action, "https://sp/slo");

        let xml = post::decode_message(&value, MessageKind::LogoutRequest).unwrap();
        let document = SecureXmlLoader::new().load(&xml).unwrap();
        assert_eq!(document.attr("InResponseTo"), Some("_req"));
        let code = document
            .child("Status")
            .and_then(|s| s.child("StatusCode"))
            .and_then(|c| c.attr("Value"));
        assert_eq!(code, Some(status::SUCCESS));

        let keys = vec![creds.certificate().public_key().unwrap()];
        assert_eq!(SignatureValidator::validate_post(&document, &keys), Ok(()));
    }
}
