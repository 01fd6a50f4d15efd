//! SAML protocol bindings and the outbound message shape shared by both

pub mod post;
pub mod redirect;

use crate::error::{MessageKind, SamlError, SamlResult};
use crate::models::generate_auto_submit_form;
use redirect::RedirectQuery;
use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};

pub const SAML_REQUEST: &str = "SAMLRequest";
pub const SAML_RESPONSE: &str = "SAMLResponse";

/// A protocol message ready to travel through the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// HTTP-Redirect: full URL including the signed query
    Redirect { location: String },
    /// HTTP-POST: base64 message delivered by an auto-submitting form
    Post {
        action: String,
        parameter: &'static str,
        value: String,
        relay_state: Option<String>,
    },
}

impl OutboundMessage {
    pub fn post(
        action: impl Into<String>,
        parameter: &'static str,
        value: String,
        relay_state: Option<String>,
    ) -> Self {
        OutboundMessage::Post {
            action: action.into(),
            parameter,
            value,
            relay_state,
        }
    }

    /// Auto-submit HTML for POST, `None` for Redirect
    pub fn html(&self) -> Option<String> {
        match self {
            OutboundMessage::Redirect { .. } => None,
            OutboundMessage::Post {
                action,
                parameter,
                value,
                relay_state,
            } => Some(generate_auto_submit_form(
                action,
                parameter,
                value,
                relay_state.as_deref(),
            )),
        }
    }
}

impl IntoResponse for OutboundMessage {
    fn into_response(self) -> Response {
        match self {
            OutboundMessage::Redirect { location } => (
                StatusCode::FOUND,
                [
                    (header::LOCATION, location),
                    (header::CACHE_CONTROL, "no-cache, no-store".to_string()),
                ],
            )
                .into_response(),
            post => {
                let html = post.html().unwrap_or_default();
                (
                    [(header::CACHE_CONTROL, "no-cache, no-store")],
                    Html(html),
                )
                    .into_response()
            }
        }
    }
}

/// An inbound protocol message as received over either binding
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// HTTP-Redirect, kept as the raw query for signature checks
    Redirect(RedirectQuery),
    /// HTTP-POST form fields
    Post {
        message: Option<String>,
        relay_state: Option<String>,
    },
}

impl InboundMessage {
    /// Parse a raw GET query carrying `SAMLRequest`
    pub fn from_query(raw_query: &str) -> Self {
        InboundMessage::Redirect(RedirectQuery::parse(raw_query, SAML_REQUEST))
    }

    pub fn from_form(message: Option<String>, relay_state: Option<String>) -> Self {
        InboundMessage::Post {
            message,
            relay_state,
        }
    }

    pub fn relay_state(&self) -> Option<&str> {
        match self {
            InboundMessage::Redirect(query) => query.relay_state_value(),
            InboundMessage::Post { relay_state, .. } => relay_state.as_deref(),
        }
        .filter(|rs| !rs.is_empty())
    }

    /// Undo the binding's transport encoding, yielding XML text
    pub fn decode(&self, kind: MessageKind) -> SamlResult<String> {
        match self {
            InboundMessage::Redirect(query) => {
                let encoded = query
                    .message_value()
                    .filter(|v| !v.is_empty())
                    .ok_or(SamlError::MissingParameter(SAML_REQUEST))?;
                redirect::decode_message(encoded, kind)
            }
            InboundMessage::Post { message, .. } => {
                let encoded = message
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .ok_or(SamlError::MissingParameter(SAML_REQUEST))?;
                post::decode_message(encoded, kind)
            }
        }
    }
}
