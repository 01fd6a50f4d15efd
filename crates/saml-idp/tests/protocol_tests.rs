//! Protocol test suite for the SAML IdP engine
//!
//! Run with: cargo test -p saml-idp --test protocol_tests
//!
//! This suite drives the public API end to end:
//! - AuthnRequest timing windows and signature policy
//! - Response signing, encryption and attribute mapping
//! - Single Logout (SP- and IdP-initiated)
//! - The HTTP surface through the router

mod protocol;

pub use protocol::*;
