//! HTTP handlers for SAML endpoints

pub mod initiate;
pub mod metadata;
pub mod slo;
pub mod sso;

pub use initiate::idp_initiated;
pub use metadata::get_metadata;
pub use slo::{idp_logout, logout_callback, logout_post, logout_redirect};
pub use sso::{signin_callback, signin_post, signin_redirect};
