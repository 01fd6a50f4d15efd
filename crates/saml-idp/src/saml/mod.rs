//! SAML-specific utilities

pub mod attributes;
pub mod constants;
pub mod name_id;
pub mod signing;

pub use attributes::{AttributeMapper, DefaultAttributeMapper, SamlAttribute};
pub use name_id::{resolve_name_id, ResolvedNameId};
pub use signing::{
    parse_certificate, usable_rsa_certificate, usable_rsa_key, verify_with_any,
    SignatureAlgorithm, SigningCredentialProvider, SigningCredentials, StaticCredentialProvider,
};
