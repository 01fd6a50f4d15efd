//! Principal hand-off from an authenticating reverse proxy.
//!
//! The proxy terminates the login and forwards the signed-in user as a JSON
//! [`Principal`] in a configured header. The header must be stripped from
//! client traffic by the proxy; this server trusts it verbatim.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use saml_idp::Principal;
use std::sync::Arc;

/// Name of the trusted header
#[derive(Clone)]
pub struct PrincipalHeader(pub Arc<str>);

/// Attach the forwarded principal, if any, as a request extension.
///
/// A malformed header is treated as anonymous.
pub async fn forward_principal(
    State(header): State<PrincipalHeader>,
    mut request: Request,
    next: Next,
) -> Response {
    let principal = request
        .headers()
        .get(header.0.as_ref())
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| match serde_json::from_str::<Principal>(raw) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(header = %header.0, error = %e, "Ignoring malformed principal header");
                None
            }
        });

    if let Some(principal) = principal {
        request.extensions_mut().insert(principal);
    }
    next.run(request).await
}
