//! Shared fixtures: keys, certificates, state and message helpers

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::encrypt::Decrypter;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::{Padding, Rsa};
use openssl::symm::{decrypt_aead, Cipher};
use openssl::x509::{X509Builder, X509NameBuilder};
use saml_idp::bindings::{post, redirect, OutboundMessage, SAML_REQUEST};
use saml_idp::error::MessageKind;
use saml_idp::xml::{SecureXmlLoader, XmlElement};
use saml_idp::{
    FixedClock, InMemoryServiceProviderStore, SamlIdpOptions, SamlState, ServiceProvider,
    SigningCredentials, StaticCredentialProvider,
};
use std::sync::{Arc, Once};

pub const IDP_BASE: &str = "https://idp.example.com";
pub const SP_ENTITY_ID: &str = "https://sp.example.com";
pub const SP_ACS: &str = "https://sp.example.com/saml/acs";

static INIT_LOGGING: Once = Once::new();

/// Route engine logs to the test output when `RUST_LOG` is set
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

/// Fixed "now" for deterministic timing tests
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 10, 0, 0).unwrap()
}

/// A key pair with a certificate valid around [`now`]
pub struct KeyPair {
    pub key: PKey<Private>,
    pub credentials: SigningCredentials,
}

impl KeyPair {
    pub fn generate(common_name: &str) -> Self {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::from_unix((now() - Duration::days(30)).timestamp()).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::from_unix((now() + Duration::days(365)).timestamp()).unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        let certificate = builder.build();

        let credentials = SigningCredentials::new(certificate, key.clone()).unwrap();
        Self { key, credentials }
    }

    /// Base64 DER certificate, as registered on an SP
    pub fn certificate(&self) -> String {
        self.credentials.certificate_base64_der().unwrap()
    }
}

pub fn options() -> SamlIdpOptions {
    SamlIdpOptions {
        entity_id: format!("{IDP_BASE}/saml/metadata"),
        base_url: IDP_BASE.to_string(),
        login_url: format!("{IDP_BASE}/login"),
        consent_url: format!("{IDP_BASE}/consent"),
        ..SamlIdpOptions::default()
    }
}

pub fn service_provider() -> ServiceProvider {
    ServiceProvider::new(SP_ENTITY_ID, SP_ACS)
}

/// State over in-memory stores, a fixed clock and fresh IdP credentials
pub fn state_with(providers: Vec<ServiceProvider>) -> (SamlState, Arc<FixedClock>, KeyPair) {
    init_test_logging();
    let idp = KeyPair::generate("idp.example.com");
    let clock = Arc::new(FixedClock::new(now()));
    let state = SamlState::in_memory_with_clock(
        options(),
        Arc::new(InMemoryServiceProviderStore::with_providers(providers)),
        Arc::new(StaticCredentialProvider::new(idp.credentials.clone())),
        clock.clone(),
    );
    (state, clock, idp)
}

/// AuthnRequest XML issued at `issue_instant`
pub fn authn_request(id: &str, issue_instant: DateTime<Utc>) -> String {
    format!(
        r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{id}" Version="2.0" IssueInstant="{}" Destination="{IDP_BASE}/saml/signin" AssertionConsumerServiceURL="{SP_ACS}"><saml:Issuer>{SP_ENTITY_ID}</saml:Issuer></samlp:AuthnRequest>"#,
        issue_instant.format("%Y-%m-%dT%H:%M:%SZ")
    )
}

/// Unsigned HTTP-Redirect query for `xml`
pub fn redirect_query(xml: &str, relay_state: Option<&str>) -> String {
    let mut query = format!(
        "{SAML_REQUEST}={}",
        urlencoding::encode(&redirect::encode_message(xml).unwrap())
    );
    if let Some(rs) = relay_state {
        query.push_str("&RelayState=");
        query.push_str(&urlencoding::encode(rs));
    }
    query
}

/// Decode the SAML message carried by an outbound POST
pub fn posted_document(message: &OutboundMessage) -> XmlElement {
    let OutboundMessage::Post { value, .. } = message else {
        panic!("expected an HTTP-POST message, got {message:?}");
    };
    let xml = post::decode_message(value, MessageKind::AuthnRequest).unwrap();
    SecureXmlLoader::new().load(&xml).unwrap()
}

pub fn status_codes(document: &XmlElement) -> (String, Option<String>) {
    let code = document.child("Status").unwrap().child("StatusCode").unwrap();
    (
        code.attr("Value").unwrap().to_string(),
        code.child("StatusCode")
            .and_then(|c| c.attr("Value"))
            .map(String::from),
    )
}

pub fn status_message(document: &XmlElement) -> Option<String> {
    document
        .child("Status")
        .and_then(|s| s.child("StatusMessage"))
        .map(XmlElement::text)
}

/// Names of the direct child elements, in order
pub fn child_names(element: &XmlElement) -> Vec<String> {
    element
        .child_elements()
        .map(|e| e.local_name().to_string())
        .collect()
}

/// Decrypt an `EncryptedAssertion` (AES-256-GCM, RSA-OAEP key transport)
pub fn decrypt_assertion(encrypted: &XmlElement, key: &PKey<Private>) -> String {
    let data = encrypted.child("EncryptedData").unwrap();
    let cipher_value = |el: &XmlElement| {
        let text = el
            .child("CipherData")
            .unwrap()
            .child("CipherValue")
            .unwrap()
            .text();
        STANDARD.decode(text.trim()).unwrap()
    };

    let wrapped = cipher_value(data.child("KeyInfo").unwrap().child("EncryptedKey").unwrap());
    let mut decrypter = Decrypter::new(key).unwrap();
    decrypter.set_rsa_padding(Padding::PKCS1_OAEP).unwrap();
    let mut session_key = vec![0u8; decrypter.decrypt_len(&wrapped).unwrap()];
    let len = decrypter.decrypt(&wrapped, &mut session_key).unwrap();
    session_key.truncate(len);

    let payload = cipher_value(data);
    let (iv, rest) = payload.split_at(12);
    let (ciphertext, tag) = rest.split_at(rest.len() - 16);
    let plaintext = decrypt_aead(
        Cipher::aes_256_gcm(),
        &session_key,
        Some(iv),
        &[],
        ciphertext,
        tag,
    )
    .unwrap();
    String::from_utf8(plaintext).unwrap()
}
