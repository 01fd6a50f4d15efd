//! SAML route definitions

use crate::config::{
    IDP_INITIATED_PATH, IDP_LOGOUT_PATH, LOGOUT_CALLBACK_PATH, LOGOUT_PATH, METADATA_PATH,
    SIGNIN_CALLBACK_PATH, SIGNIN_PATH,
};
use crate::handlers::{
    get_metadata, idp_initiated, idp_logout, logout_callback, logout_post, logout_redirect,
    signin_callback, signin_post, signin_redirect,
};
use crate::state::SamlState;
use axum::{
    routing::{get, post},
    Router,
};

/// Create the SAML IdP router.
///
/// The host authenticates users and inserts the signed-in [`Principal`] as a
/// request extension ahead of these routes.
///
/// [`Principal`]: crate::models::Principal
pub fn saml_router(state: SamlState) -> Router {
    Router::new()
        .route(METADATA_PATH, get(get_metadata))
        .route(SIGNIN_PATH, get(signin_redirect).post(signin_post))
        .route(SIGNIN_CALLBACK_PATH, get(signin_callback))
        .route(LOGOUT_PATH, get(logout_redirect).post(logout_post))
        .route(LOGOUT_CALLBACK_PATH, get(logout_callback))
        .route(IDP_INITIATED_PATH, get(idp_initiated))
        .route(IDP_LOGOUT_PATH, post(idp_logout))
        .with_state(state)
}
