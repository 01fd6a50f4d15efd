//! SAML SSO handlers for SP-initiated SSO

use crate::bindings::InboundMessage;
use crate::error::SamlResult;
use crate::models::{Principal, SamlPostForm, SigninCallbackQuery};
use crate::services::{SigninOutcome, SigninService};
use crate::state::SamlState;
use axum::{
    extract::{Query, RawQuery, State},
    response::{IntoResponse, Redirect, Response},
    Extension, Form,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

/// SP-initiated SSO via HTTP-Redirect binding
pub async fn signin_redirect(
    State(state): State<SamlState>,
    principal: Option<Extension<Principal>>,
    jar: CookieJar,
    RawQuery(query): RawQuery,
) -> Response {
    let message = InboundMessage::from_query(query.as_deref().unwrap_or_default());
    match handle_signin(&state, jar, &message, principal.as_ref().map(|p| &p.0)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "SSO redirect failed");
            e.into_response()
        }
    }
}

/// SP-initiated SSO via HTTP-POST binding
pub async fn signin_post(
    State(state): State<SamlState>,
    principal: Option<Extension<Principal>>,
    jar: CookieJar,
    Form(form): Form<SamlPostForm>,
) -> Response {
    let message = InboundMessage::from_form(form.saml_request, form.relay_state);
    match handle_signin(&state, jar, &message, principal.as_ref().map(|p| &p.0)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "SSO POST failed");
            e.into_response()
        }
    }
}

/// Return point of the host's login and consent steps
pub async fn signin_callback(
    State(state): State<SamlState>,
    principal: Option<Extension<Principal>>,
    jar: CookieJar,
    Query(query): Query<SigninCallbackQuery>,
) -> Response {
    let cookie_name = state.options.state_cookie_name.clone();
    let state_id = jar.get(&cookie_name).map(|c| c.value().to_string());
    let jar = jar.remove(Cookie::build(cookie_name).path("/saml"));

    let outcome = SigninService::new(&state)
        .signin_callback(
            state_id.as_deref(),
            principal.as_ref().map(|p| &p.0),
            query.consent,
        )
        .await;
    match outcome {
        Ok(outcome) => into_response(&state, jar, outcome),
        Err(e) => {
            tracing::error!(error = %e, "SSO callback failed");
            (jar, e.into_response()).into_response()
        }
    }
}

async fn handle_signin(
    state: &SamlState,
    jar: CookieJar,
    message: &InboundMessage,
    principal: Option<&Principal>,
) -> SamlResult<Response> {
    let outcome = SigninService::new(state).signin(message, principal).await?;
    Ok(into_response(state, jar, outcome))
}

fn into_response(state: &SamlState, jar: CookieJar, outcome: SigninOutcome) -> Response {
    match outcome {
        SigninOutcome::Respond(message) => (jar, message).into_response(),
        SigninOutcome::Interaction { location, state_id } => {
            let cookie = Cookie::build((state.options.state_cookie_name.clone(), state_id))
                .path("/saml")
                .http_only(true)
                .secure(state.options.base_url.starts_with("https://"))
                .same_site(SameSite::Lax)
                .build();
            (jar.add(cookie), Redirect::to(&location)).into_response()
        }
    }
}
