//! SAML 2.0 Identity Provider protocol engine
//!
//! This crate provides:
//! - SP-initiated SSO over the HTTP-Redirect and HTTP-POST bindings
//! - IdP-initiated (unsolicited) SSO
//! - SP- and IdP-initiated Single Logout with deferred completion
//! - Assertion signing and encryption
//! - IdP metadata generation
//!
//! Authentication itself stays with the host: it renders login and consent,
//! then hands the signed-in [`Principal`] to the handlers as a request
//! extension.

pub mod bindings;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod saml;
pub mod services;
pub mod session;
pub mod state;
pub mod xml;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SamlIdpOptions;
pub use error::{SamlError, SamlResult};
pub use models::{
    InMemoryServiceProviderStore, Principal, SamlBinding, ServiceProvider, ServiceProviderStore,
    SigningBehavior, SingleLogoutService,
};
pub use router::saml_router;
pub use saml::{SigningCredentialProvider, SigningCredentials, StaticCredentialProvider};
pub use services::{LogoutOutcome, SigninOutcome, SigninService, SloService};
pub use session::{InMemorySpSessionStore, SpSession, SpSessionStore};
pub use state::SamlState;
