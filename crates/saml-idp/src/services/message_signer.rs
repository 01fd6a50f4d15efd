//! Enveloped XML-DSig signing of outbound messages

use crate::error::{SamlError, SamlResult};
use crate::models::SigningBehavior;
use crate::saml::constants::{algorithms, DSIG_NS};
use crate::saml::{SignatureAlgorithm, SigningCredentials};
use crate::xml::{canonicalize, C14nOptions, XmlElement, EXCLUSIVE_C14N};
use base64::{engine::general_purpose::STANDARD, Engine};
use openssl::hash::{hash, MessageDigest};

/// Signs elements in place with exclusive c14n, RSA-SHA256 and a SHA-256 digest
pub struct MessageSigner<'a> {
    credentials: &'a SigningCredentials,
}

impl<'a> MessageSigner<'a> {
    pub fn new(credentials: &'a SigningCredentials) -> Self {
        Self { credentials }
    }

    /// Sign the element carrying `ID=element_id`. The `Signature` is inserted
    /// directly after that element's `Issuer`.
    pub fn sign_element(&self, document: &mut XmlElement, element_id: &str) -> SamlResult<()> {
        let target = document
            .find_by_id(element_id)
            .ok_or_else(|| SamlError::Internal(format!("no element with ID {element_id}")))?;

        let canonical = canonicalize(document, target, &C14nOptions::default())
            .map_err(|e| SamlError::Internal(format!("signing target: {e}")))?;
        let digest = hash(MessageDigest::sha256(), canonical.as_bytes())?;

        let mut signature = XmlElement::new("ds:Signature")
            .with_attr("xmlns:ds", DSIG_NS)
            .with_child(signed_info(element_id, &STANDARD.encode(digest)));

        // SignedInfo has no ancestors besides Signature, so canonicalizing it here
        // matches what a verifier computes inside the final document
        let signed_info = signature
            .child("SignedInfo")
            .ok_or_else(|| SamlError::Internal("SignedInfo missing".to_string()))?;
        let signed_info_c14n = canonicalize(&signature, signed_info, &C14nOptions::default())
            .map_err(|e| SamlError::Internal(format!("SignedInfo: {e}")))?;

        let signature_value = self
            .credentials
            .sign(SignatureAlgorithm::RsaSha256, signed_info_c14n.as_bytes())?;

        signature.push_child(
            XmlElement::new("ds:SignatureValue").with_text(STANDARD.encode(signature_value)),
        );
        signature.push_child(
            XmlElement::new("ds:KeyInfo").with_child(
                XmlElement::new("ds:X509Data").with_child(
                    XmlElement::new("ds:X509Certificate")
                        .with_text(self.credentials.certificate_base64_der()?),
                ),
            ),
        );

        let target = document
            .find_by_id_mut(element_id)
            .ok_or_else(|| SamlError::Internal(format!("no element with ID {element_id}")))?;
        if !target.insert_after("Issuer", signature) {
            return Err(SamlError::Internal(format!(
                "element {element_id} has no Issuer to anchor the signature"
            )));
        }
        Ok(())
    }
}

fn signed_info(reference_id: &str, digest_b64: &str) -> XmlElement {
    XmlElement::new("ds:SignedInfo")
        .with_child(
            XmlElement::new("ds:CanonicalizationMethod").with_attr("Algorithm", EXCLUSIVE_C14N),
        )
        .with_child(
            XmlElement::new("ds:SignatureMethod").with_attr("Algorithm", algorithms::RSA_SHA256),
        )
        .with_child(
            XmlElement::new("ds:Reference")
                .with_attr("URI", format!("#{reference_id}"))
                .with_child(
                    XmlElement::new("ds:Transforms")
                        .with_child(
                            XmlElement::new("ds:Transform")
                                .with_attr("Algorithm", algorithms::ENVELOPED_SIGNATURE),
                        )
                        .with_child(
                            XmlElement::new("ds:Transform").with_attr("Algorithm", EXCLUSIVE_C14N),
                        ),
                )
                .with_child(
                    XmlElement::new("ds:DigestMethod")
                        .with_attr("Algorithm", algorithms::DIGEST_SHA256),
                )
                .with_child(XmlElement::new("ds:DigestValue").with_text(digest_b64)),
        )
}

/// Where the signing steps of a Response run relative to encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningPlan {
    pub sign_assertion: bool,
    pub sign_response: bool,
}

impl SigningPlan {
    /// Success Responses follow the SP's behavior
    pub fn for_success(behavior: SigningBehavior) -> Self {
        Self {
            sign_assertion: behavior.signs_assertion(),
            sign_response: behavior.signs_response(),
        }
    }

    /// Error Responses carry no assertion; they are signed at Response level
    /// unless the SP opted out of signing entirely
    pub fn for_error(behavior: SigningBehavior) -> Self {
        Self {
            sign_assertion: false,
            sign_response: behavior != SigningBehavior::DoNotSign,
        }
    }
}
