//! Business logic services for SAML operations

pub mod assertion_builder;
pub mod assertion_encryptor;
pub mod logout_parser;
pub mod message_signer;
pub mod metadata_generator;
pub mod request_parser;
pub mod request_validator;
pub mod signature_validator;
pub mod signin_service;
pub mod slo_builder;
pub mod slo_service;

pub use assertion_builder::AssertionBuilder;
pub use assertion_encryptor::AssertionEncryptor;
pub use message_signer::{MessageSigner, SigningPlan};
pub use metadata_generator::MetadataGenerator;
pub use request_parser::RequestParser;
pub use request_validator::{AuthnContextEvaluator, RankedAuthnContextEvaluator, RequestValidator};
pub use signature_validator::SignatureValidator;
pub use signin_service::{SigninOutcome, SigninService};
pub use slo_builder::SloBuilder;
pub use slo_service::{LogoutOutcome, SloService};
