//! Data models for the SAML IdP

pub mod principal;
pub mod requests;
pub mod responses;
pub mod service_provider;
pub mod status;

pub use principal::{Claim, Principal};
pub use requests::{
    AuthnContextComparison, AuthnRequest, LogoutRequest, NameId, NameIdPolicy,
    RequestedAuthnContext,
};
pub use responses::{
    generate_auto_submit_form, ConsentDecision, FrontChannelTarget, IdpInitiatedQuery,
    IdpLogoutResponse, LogoutCallbackQuery, LogoutPendingResponse, SamlPostForm,
    SigninCallbackQuery,
};
pub use service_provider::{
    InMemoryServiceProviderStore, SamlBinding, ServiceProvider, ServiceProviderStore,
    SigningBehavior, SingleLogoutService,
};
pub use status::{SamlStatus, StatusCode};
