//! SAML Assertion and Response builder
//!
//! Builds typed message models first and renders them to element trees, so
//! signing and encryption operate on structure rather than string offsets.

use crate::config::SamlIdpOptions;
use crate::error::SamlResult;
use crate::models::{Principal, SamlStatus, ServiceProvider};
use crate::saml::constants::{
    ASSERTION_NS, BEARER_CONFIRMATION, PROTOCOL_NS, SAML_VERSION, XSI_NS, XS_NS,
};
use crate::saml::{resolve_name_id, ResolvedNameId, SamlAttribute};
use crate::xml::XmlElement;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// `xs:dateTime` in UTC with second precision
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// NCName-safe message identifier
pub fn generate_id(kind: &str) -> String {
    format!("_{kind}_{}", Uuid::new_v4())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectConfirmationData {
    pub not_on_or_after: DateTime<Utc>,
    pub recipient: String,
    pub in_response_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditions {
    pub not_before: DateTime<Utc>,
    pub not_on_or_after: DateTime<Utc>,
    pub audience: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnStatement {
    pub authn_instant: DateTime<Utc>,
    pub session_index: String,
    pub class_ref: String,
}

/// A bearer assertion for one SP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlAssertion {
    pub id: String,
    pub issue_instant: DateTime<Utc>,
    pub issuer: String,
    pub name_id: ResolvedNameId,
    pub confirmation: SubjectConfirmationData,
    pub conditions: Conditions,
    pub authn_statement: AuthnStatement,
    pub attributes: Vec<SamlAttribute>,
}

/// `samlp:Response`. Success responses carry exactly one assertion, error
/// responses none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlResponse {
    pub id: String,
    pub issue_instant: DateTime<Utc>,
    pub issuer: String,
    pub destination: String,
    pub in_response_to: Option<String>,
    pub status: SamlStatus,
    pub assertion: Option<SamlAssertion>,
}

/// Everything the builder needs to issue an assertion
#[derive(Debug, Clone, Copy)]
pub struct AssertionRequest<'a> {
    pub sp: &'a ServiceProvider,
    pub principal: &'a Principal,
    pub acs_url: &'a str,
    /// Absent for unsolicited responses
    pub in_response_to: Option<&'a str>,
    pub requested_name_id_format: Option<&'a str>,
    pub authn_context_class_ref: &'a str,
}

/// Builder for SAML assertions and responses
pub struct AssertionBuilder<'a> {
    options: &'a SamlIdpOptions,
    now: DateTime<Utc>,
}

impl<'a> AssertionBuilder<'a> {
    pub fn new(options: &'a SamlIdpOptions, now: DateTime<Utc>) -> Self {
        Self { options, now }
    }

    pub fn build_assertion(
        &self,
        request: AssertionRequest<'_>,
        attributes: Vec<SamlAttribute>,
    ) -> SamlResult<SamlAssertion> {
        let sp = request.sp;
        let name_id = resolve_name_id(
            request.requested_name_id_format,
            request.principal,
            sp,
            self.options,
        )?;

        let max_age = sp.request_max_age(self.options);
        let skew = sp.clock_skew(self.options);
        let not_on_or_after = self.now + max_age;

        Ok(SamlAssertion {
            id: generate_id("assert"),
            issue_instant: self.now,
            issuer: self.options.entity_id.clone(),
            name_id,
            confirmation: SubjectConfirmationData {
                not_on_or_after,
                recipient: request.acs_url.to_string(),
                in_response_to: request.in_response_to.map(String::from),
            },
            conditions: Conditions {
                not_before: self.now - skew,
                not_on_or_after,
                audience: sp.entity_id.clone(),
            },
            authn_statement: AuthnStatement {
                authn_instant: request.principal.authn_instant,
                session_index: request.principal.session_id.clone(),
                class_ref: request.authn_context_class_ref.to_string(),
            },
            attributes,
        })
    }

    /// Response carrying `assertion`; `status` is Success, optionally with a sub-code
    pub fn success_response(
        &self,
        destination: &str,
        in_response_to: Option<&str>,
        status: SamlStatus,
        assertion: SamlAssertion,
    ) -> SamlResponse {
        SamlResponse {
            id: generate_id("resp"),
            issue_instant: self.now,
            issuer: self.options.entity_id.clone(),
            destination: destination.to_string(),
            in_response_to: in_response_to.map(String::from),
            status,
            assertion: Some(assertion),
        }
    }

    pub fn error_response(
        &self,
        destination: &str,
        in_response_to: Option<&str>,
        status: SamlStatus,
    ) -> SamlResponse {
        SamlResponse {
            id: generate_id("resp"),
            issue_instant: self.now,
            issuer: self.options.entity_id.clone(),
            destination: destination.to_string(),
            in_response_to: in_response_to.map(String::from),
            status,
            assertion: None,
        }
    }
}

pub(crate) fn issuer_element(issuer: &str) -> XmlElement {
    XmlElement::new("saml:Issuer").with_text(issuer)
}

pub(crate) fn status_element(status: &SamlStatus) -> XmlElement {
    let mut code = XmlElement::new("samlp:StatusCode").with_attr("Value", status.code.uri());
    if let Some(sub_code) = status.sub_code {
        code.push_child(XmlElement::new("samlp:StatusCode").with_attr("Value", sub_code.uri()));
    }
    let mut element = XmlElement::new("samlp:Status").with_child(code);
    if let Some(message) = &status.message {
        element.push_child(XmlElement::new("samlp:StatusMessage").with_text(message.as_str()));
    }
    element
}

impl SamlAssertion {
    pub fn to_element(&self) -> XmlElement {
        let instant = format_instant(self.issue_instant);

        let name_id = XmlElement::new("saml:NameID")
            .with_attr("Format", self.name_id.format.as_str())
            .with_optional_attr("SPNameQualifier", self.name_id.sp_name_qualifier.as_deref())
            .with_text(self.name_id.value.as_str());

        let subject = XmlElement::new("saml:Subject").with_child(name_id).with_child(
            XmlElement::new("saml:SubjectConfirmation")
                .with_attr("Method", BEARER_CONFIRMATION)
                .with_child(
                    XmlElement::new("saml:SubjectConfirmationData")
                        .with_attr(
                            "NotOnOrAfter",
                            format_instant(self.confirmation.not_on_or_after),
                        )
                        .with_attr("Recipient", self.confirmation.recipient.as_str())
                        .with_optional_attr(
                            "InResponseTo",
                            self.confirmation.in_response_to.as_deref(),
                        ),
                ),
        );

        let conditions = XmlElement::new("saml:Conditions")
            .with_attr("NotBefore", format_instant(self.conditions.not_before))
            .with_attr("NotOnOrAfter", format_instant(self.conditions.not_on_or_after))
            .with_child(
                XmlElement::new("saml:AudienceRestriction").with_child(
                    XmlElement::new("saml:Audience").with_text(self.conditions.audience.as_str()),
                ),
            );

        let authn_statement = XmlElement::new("saml:AuthnStatement")
            .with_attr("AuthnInstant", format_instant(self.authn_statement.authn_instant))
            .with_attr("SessionIndex", self.authn_statement.session_index.as_str())
            .with_child(
                XmlElement::new("saml:AuthnContext").with_child(
                    XmlElement::new("saml:AuthnContextClassRef")
                        .with_text(self.authn_statement.class_ref.as_str()),
                ),
            );

        let mut assertion = XmlElement::new("saml:Assertion")
            .with_attr("xmlns:saml", ASSERTION_NS)
            .with_attr("xmlns:xs", XS_NS)
            .with_attr("xmlns:xsi", XSI_NS)
            .with_attr("ID", self.id.as_str())
            .with_attr("Version", SAML_VERSION)
            .with_attr("IssueInstant", instant)
            .with_child(issuer_element(&self.issuer))
            .with_child(subject)
            .with_child(conditions)
            .with_child(authn_statement);

        if !self.attributes.is_empty() {
            let mut statement = XmlElement::new("saml:AttributeStatement");
            for attribute in &self.attributes {
                statement.push_child(attribute_element(attribute));
            }
            assertion.push_child(statement);
        }

        assertion
    }
}

fn attribute_element(attribute: &SamlAttribute) -> XmlElement {
    let mut element = XmlElement::new("saml:Attribute")
        .with_attr("Name", attribute.name.as_str())
        .with_attr("NameFormat", attribute.name_format.as_str())
        .with_optional_attr("FriendlyName", attribute.friendly_name.as_deref());
    for value in &attribute.values {
        element.push_child(
            XmlElement::new("saml:AttributeValue")
                .with_attr("xsi:type", "xs:string")
                .with_text(value.as_str()),
        );
    }
    element
}

impl SamlResponse {
    pub fn assertion_id(&self) -> Option<&str> {
        self.assertion.as_ref().map(|a| a.id.as_str())
    }

    pub fn to_element(&self) -> XmlElement {
        let mut response = XmlElement::new("samlp:Response")
            .with_attr("xmlns:samlp", PROTOCOL_NS)
            .with_attr("xmlns:saml", ASSERTION_NS)
            .with_attr("ID", self.id.as_str())
            .with_attr("Version", SAML_VERSION)
            .with_attr("IssueInstant", format_instant(self.issue_instant))
            .with_attr("Destination", self.destination.as_str())
            .with_optional_attr("InResponseTo", self.in_response_to.as_deref())
            .with_child(issuer_element(&self.issuer))
            .with_child(status_element(&self.status));

        if let Some(assertion) = &self.assertion {
            response.push_child(assertion.to_element());
        }
        response
    }
}
