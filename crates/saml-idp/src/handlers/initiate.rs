//! IdP-initiated SSO handler

use crate::models::{IdpInitiatedQuery, Principal};
use crate::services::SigninService;
use crate::state::SamlState;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Extension,
};

/// IdP-initiated SSO: unsolicited Response to the SP's default ACS
pub async fn idp_initiated(
    State(state): State<SamlState>,
    principal: Option<Extension<Principal>>,
    Query(query): Query<IdpInitiatedQuery>,
) -> Response {
    let result = SigninService::new(&state)
        .idp_initiated(
            query.sp_entity_id.as_deref(),
            query.relay_state.as_deref(),
            principal.as_ref().map(|p| &p.0),
        )
        .await;
    match result {
        Ok(message) => message.into_response(),
        Err(e) => {
            tracing::error!(
                error = %e,
                sp = ?query.sp_entity_id,
                "IdP-initiated SSO failed"
            );
            e.into_response()
        }
    }
}
