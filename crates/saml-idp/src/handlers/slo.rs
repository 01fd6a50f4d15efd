//! SAML Single Logout handlers

use crate::bindings::InboundMessage;
use crate::error::SamlResult;
use crate::models::{LogoutCallbackQuery, Principal, SamlPostForm};
use crate::services::{LogoutOutcome, SloService};
use crate::state::SamlState;
use axum::{
    extract::{Query, RawQuery, State},
    response::{IntoResponse, Response},
    Extension, Form, Json,
};

/// SP-initiated logout via HTTP-Redirect binding
pub async fn logout_redirect(
    State(state): State<SamlState>,
    RawQuery(query): RawQuery,
) -> Response {
    let message = InboundMessage::from_query(query.as_deref().unwrap_or_default());
    match handle_logout(&state, &message).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "SLO redirect failed");
            e.into_response()
        }
    }
}

/// SP-initiated logout via HTTP-POST binding
pub async fn logout_post(
    State(state): State<SamlState>,
    Form(form): Form<SamlPostForm>,
) -> Response {
    let message = InboundMessage::from_form(form.saml_request, form.relay_state);
    match handle_logout(&state, &message).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "SLO POST failed");
            e.into_response()
        }
    }
}

/// Completes a deferred logout once the host has ended its session
pub async fn logout_callback(
    State(state): State<SamlState>,
    Query(query): Query<LogoutCallbackQuery>,
) -> Response {
    match SloService::new(&state)
        .logout_callback(query.logout_id.as_deref())
        .await
    {
        Ok(message) => message.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "SLO callback failed");
            e.into_response()
        }
    }
}

/// IdP-initiated logout for the signed-in principal
pub async fn idp_logout(
    State(state): State<SamlState>,
    principal: Option<Extension<Principal>>,
) -> Response {
    match SloService::new(&state)
        .idp_initiated_logout(principal.as_ref().map(|p| &p.0))
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "IdP-initiated logout failed");
            e.into_response()
        }
    }
}

async fn handle_logout(state: &SamlState, message: &InboundMessage) -> SamlResult<Response> {
    match SloService::new(state).sp_initiated_logout(message).await? {
        LogoutOutcome::Respond(message) => Ok(message.into_response()),
        LogoutOutcome::Pending(pending) => Ok(Json(pending).into_response()),
    }
}
