//! SAML-specific error types

use crate::saml::constants::status;
use crate::session::StoreError;
use crate::xml::XmlLoadError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Result type for SAML operations
pub type SamlResult<T> = Result<T, SamlError>;

/// Inbound message families, used to pick the caller-facing format error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    AuthnRequest,
    LogoutRequest,
}

impl MessageKind {
    pub fn invalid_format_message(self) -> &'static str {
        match self {
            MessageKind::AuthnRequest => "Invalid SAMLRequest format",
            MessageKind::LogoutRequest => "Invalid LogoutRequest format",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::AuthnRequest => f.write_str("AuthnRequest"),
            MessageKind::LogoutRequest => f.write_str("LogoutRequest"),
        }
    }
}

/// Structural problems found while turning a loaded document into a request model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected root element {expected}, found {found}")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },

    #[error("root element is not in the SAML 2.0 protocol namespace")]
    WrongNamespace,

    #[error("missing required attribute {0}")]
    MissingAttribute(&'static str),

    #[error("missing required element {0}")]
    MissingElement(&'static str),

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("unknown AuthnContextComparison value: {0}")]
    UnknownComparison(String),

    #[error("RequestedAuthnContext contains no AuthnContextClassRef values")]
    EmptyAuthnContext,
}

/// Signature verification failures. The `Display` text is safe to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureFailure {
    #[error("Missing signature parameter")]
    MissingParameter,

    #[error("Signature element not found")]
    ElementNotFound,

    #[error("Unsupported signature algorithm")]
    UnsupportedAlgorithm,

    #[error("Invalid signature")]
    Invalid,
}

/// SAML-specific errors
#[derive(Debug, Error)]
pub enum SamlError {
    /// Required transport parameter absent
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// Undecodable or structurally invalid request; `detail` is for logs only
    #[error("Invalid {kind}: {detail}")]
    InvalidMessage { kind: MessageKind, detail: String },

    /// Secure loader refused the document
    #[error("XML document rejected: {0}")]
    XmlRejected(#[from] XmlLoadError),

    #[error("RelayState exceeds maximum allowed length")]
    RelayStateTooLong,

    /// Issuer is not a registered, enabled Service Provider
    #[error("Service Provider '{0}' is not registered or is disabled")]
    UnknownServiceProvider(String),

    #[error("{0}")]
    SignatureRejected(SignatureFailure),

    /// SP requires signed requests but none of its certificates are usable
    #[error("No valid certificates configured for service provider '{0}'")]
    NoValidSigningCertificates(String),

    /// Explicit ACS URL is not registered for the SP
    #[error("ACS URL is not registered for this service provider: {actual}")]
    AcsUrlMismatch { actual: String },

    #[error("AssertionConsumerServiceIndex {0} is out of range")]
    InvalidAcsIndex(u32),

    /// Static SP configuration cannot serve the request
    #[error("Service provider '{entity_id}' is misconfigured: {detail}")]
    ServiceProviderMisconfigured { entity_id: String, detail: String },

    #[error("No valid encryption certificate available for service provider '{0}'")]
    NoValidEncryptionCertificate(String),

    /// SP sent a logout message but has nowhere to receive the LogoutResponse
    #[error("Service provider '{0}' has no single logout endpoint")]
    SingleLogoutNotSupported(String),

    /// NameID could not be produced for a format that must not degrade
    #[error("Unable to resolve NameID for format {format}: {detail}")]
    NameIdUnavailable { format: String, detail: String },

    #[error("IdP-initiated sign-in is not allowed for service provider '{0}'")]
    IdpInitiatedNotAllowed(String),

    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("Sign-in request not found or already completed")]
    SigninStateNotFound,

    #[error("Logout request not found or already completed")]
    LogoutMessageNotFound,

    /// IdP signing key or certificate unavailable or unusable
    #[error("Signing credentials unavailable: {0}")]
    SigningCredentials(String),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SamlError {
    pub fn invalid_message(kind: MessageKind, detail: impl ToString) -> Self {
        SamlError::InvalidMessage {
            kind,
            detail: detail.to_string(),
        }
    }
}

impl From<openssl::error::ErrorStack> for SamlError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        SamlError::Crypto(err.to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saml_status: Option<String>,
}

impl IntoResponse for SamlError {
    fn into_response(self) -> Response {
        let (status_code, error_code, saml_status) = match &self {
            SamlError::MissingParameter(_) => (StatusCode::BAD_REQUEST, "invalid_request", None),
            SamlError::InvalidMessage { .. } => (
                StatusCode::BAD_REQUEST,
                "invalid_request",
                Some(status::REQUESTER),
            ),
            SamlError::XmlRejected(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_document",
                Some(status::REQUESTER),
            ),
            SamlError::RelayStateTooLong => (StatusCode::BAD_REQUEST, "invalid_request", None),
            SamlError::UnknownServiceProvider(_) => {
                (StatusCode::BAD_REQUEST, "unknown_sp", Some(status::REQUESTER))
            }
            SamlError::SignatureRejected(_) => (
                StatusCode::BAD_REQUEST,
                "signature_validation_failed",
                Some(status::REQUESTER),
            ),
            SamlError::NoValidSigningCertificates(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "sp_configuration_error",
                Some(status::RESPONDER),
            ),
            SamlError::AcsUrlMismatch { .. } => (
                StatusCode::BAD_REQUEST,
                "acs_url_mismatch",
                Some(status::REQUESTER),
            ),
            SamlError::InvalidAcsIndex(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_acs_index",
                Some(status::REQUESTER),
            ),
            SamlError::ServiceProviderMisconfigured { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "sp_configuration_error",
                Some(status::RESPONDER),
            ),
            SamlError::NoValidEncryptionCertificate(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "sp_configuration_error",
                Some(status::RESPONDER),
            ),
            SamlError::SingleLogoutNotSupported(_) => (
                StatusCode::BAD_REQUEST,
                "slo_not_supported",
                Some(status::REQUESTER),
            ),
            SamlError::NameIdUnavailable { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "nameid_unavailable",
                Some(status::RESPONDER),
            ),
            SamlError::IdpInitiatedNotAllowed(_) => (
                StatusCode::FORBIDDEN,
                "idp_initiated_not_allowed",
                Some(status::REQUEST_DENIED),
            ),
            SamlError::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                "not_authenticated",
                Some(status::AUTHN_FAILED),
            ),
            SamlError::SigninStateNotFound => {
                (StatusCode::BAD_REQUEST, "unknown_request", None)
            }
            SamlError::LogoutMessageNotFound => {
                (StatusCode::BAD_REQUEST, "unknown_logout", None)
            }
            SamlError::SigningCredentials(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "no_signing_credentials",
                Some(status::RESPONDER),
            ),
            SamlError::Crypto(_) | SamlError::Store(_) | SamlError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let message = match &self {
            SamlError::InvalidMessage { kind, detail } => {
                tracing::warn!(kind = %kind, detail = %detail, "Rejected malformed SAML message");
                kind.invalid_format_message().to_string()
            }
            SamlError::XmlRejected(err) => err.external_message().to_string(),
            SamlError::SignatureRejected(failure) => failure.to_string(),
            SamlError::NoValidSigningCertificates(entity_id) => {
                tracing::error!(sp = %entity_id, "SP has no usable signing certificates");
                "No valid certificates configured for service provider".to_string()
            }
            SamlError::AcsUrlMismatch { .. } => {
                "ACS URL does not match any registered URL".to_string()
            }
            SamlError::ServiceProviderMisconfigured { entity_id, detail } => {
                tracing::error!(sp = %entity_id, detail = %detail, "SP configuration error");
                "Service provider configuration is invalid".to_string()
            }
            SamlError::NoValidEncryptionCertificate(_) => {
                "No valid encryption certificate available for service provider".to_string()
            }
            SamlError::NameIdUnavailable { format, detail } => {
                tracing::error!(format = %format, detail = %detail, "NameID resolution failed");
                "Unable to resolve NameID for the requested format".to_string()
            }
            SamlError::SigningCredentials(msg) => {
                tracing::error!("SAML signing credentials error: {}", msg);
                "Signing credentials are unavailable".to_string()
            }
            SamlError::Crypto(msg) => {
                tracing::error!("SAML cryptographic error: {}", msg);
                "An internal error occurred".to_string()
            }
            SamlError::Store(err) => {
                tracing::error!("SAML state store error: {}", err);
                "A state storage error occurred".to_string()
            }
            SamlError::Internal(msg) => {
                tracing::error!("SAML internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            // Safe user-facing messages (contain only client-provided values)
            SamlError::MissingParameter(_)
            | SamlError::RelayStateTooLong
            | SamlError::UnknownServiceProvider(_)
            | SamlError::InvalidAcsIndex(_)
            | SamlError::SingleLogoutNotSupported(_)
            | SamlError::IdpInitiatedNotAllowed(_)
            | SamlError::NotAuthenticated
            | SamlError::SigninStateNotFound
            | SamlError::LogoutMessageNotFound => self.to_string(),
        };

        let body = ErrorResponse {
            error: error_code.to_string(),
            message,
            saml_status: saml_status.map(String::from),
        };

        (status_code, Json(body)).into_response()
    }
}
