//! `samlp:Status` values carried by Responses and LogoutResponses

use crate::saml::constants::status;
use serde::{Deserialize, Serialize};

/// Top-level or second-level status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Success,
    Requester,
    Responder,
    VersionMismatch,
    InvalidNameIdPolicy,
    NoPassive,
    NoAuthnContext,
    RequestDenied,
    UnsupportedBinding,
    AuthnFailed,
}

impl StatusCode {
    pub fn uri(self) -> &'static str {
        match self {
            StatusCode::Success => status::SUCCESS,
            StatusCode::Requester => status::REQUESTER,
            StatusCode::Responder => status::RESPONDER,
            StatusCode::VersionMismatch => status::VERSION_MISMATCH,
            StatusCode::InvalidNameIdPolicy => status::INVALID_NAMEID_POLICY,
            StatusCode::NoPassive => status::NO_PASSIVE,
            StatusCode::NoAuthnContext => status::NO_AUTHN_CONTEXT,
            StatusCode::RequestDenied => status::REQUEST_DENIED,
            StatusCode::UnsupportedBinding => status::UNSUPPORTED_BINDING,
            StatusCode::AuthnFailed => status::AUTHN_FAILED,
        }
    }
}

/// Status with optional sub-code and message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlStatus {
    pub code: StatusCode,
    pub sub_code: Option<StatusCode>,
    pub message: Option<String>,
}

impl SamlStatus {
    pub fn success() -> Self {
        Self {
            code: StatusCode::Success,
            sub_code: None,
            message: None,
        }
    }

    pub fn requester(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Requester,
            sub_code: None,
            message: Some(message.into()),
        }
    }

    pub fn responder(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Responder,
            sub_code: None,
            message: Some(message.into()),
        }
    }

    pub fn version_mismatch() -> Self {
        Self {
            code: StatusCode::VersionMismatch,
            sub_code: None,
            message: Some("Unsupported SAML version".to_string()),
        }
    }

    #[must_use]
    pub fn with_sub_code(mut self, sub_code: StatusCode) -> Self {
        self.sub_code = Some(sub_code);
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }
}
