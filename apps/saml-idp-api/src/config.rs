//! Application configuration loaded from environment variables.
//!
//! Loading is fail-fast: a required variable that is missing or invalid stops
//! startup with a clear message.

use saml_idp::{SamlIdpOptions, ServiceProvider, SigningCredentials};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Failed to parse port: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    pub options: SamlIdpOptions,
    pub signing_certificate_path: PathBuf,
    pub signing_key_path: PathBuf,
    /// JSON array of service providers
    pub service_providers_path: Option<PathBuf>,
    /// Header through which an authenticating reverse proxy passes the
    /// signed-in principal as JSON. Unset disables it.
    pub principal_header: Option<String>,
}

impl Config {
    /// Load configuration from the environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &str| lookup(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()));

        let defaults = SamlIdpOptions::default();
        let base_url = required("SAML_IDP_BASE_URL")?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                var: "SAML_IDP_BASE_URL".to_string(),
                message: "must be an absolute http(s) URL".to_string(),
            });
        }
        let base = base_url.trim_end_matches('/').to_string();

        let options = SamlIdpOptions {
            entity_id: lookup("SAML_IDP_ENTITY_ID").unwrap_or_else(|| format!("{base}/saml/metadata")),
            login_url: lookup("SAML_IDP_LOGIN_URL").unwrap_or_else(|| format!("{base}/account/login")),
            consent_url: lookup("SAML_IDP_CONSENT_URL")
                .unwrap_or_else(|| format!("{base}/account/consent")),
            max_relay_state_length: parse_or(
                &lookup,
                "SAML_IDP_MAX_RELAY_STATE_LENGTH",
                defaults.max_relay_state_length,
            )?,
            metadata_validity_secs: parse_or(
                &lookup,
                "SAML_IDP_METADATA_VALIDITY_SECS",
                defaults.metadata_validity_secs,
            )?,
            want_authn_requests_signed: parse_or(
                &lookup,
                "SAML_IDP_WANT_AUTHN_REQUESTS_SIGNED",
                defaults.want_authn_requests_signed,
            )?,
            signin_state_ttl_secs: parse_or(
                &lookup,
                "SAML_IDP_SIGNIN_STATE_TTL_SECS",
                defaults.signin_state_ttl_secs,
            )?,
            logout_message_ttl_secs: parse_or(
                &lookup,
                "SAML_IDP_LOGOUT_MESSAGE_TTL_SECS",
                defaults.logout_message_ttl_secs,
            )?,
            base_url: base,
            ..defaults
        };

        let port: u16 = lookup("PORT").unwrap_or_else(|| "8080".to_string()).parse()?;
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                var: "PORT".to_string(),
                message: "must be non-zero".to_string(),
            });
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            options,
            signing_certificate_path: required("SAML_IDP_SIGNING_CERT_PATH")?.into(),
            signing_key_path: required("SAML_IDP_SIGNING_KEY_PATH")?.into(),
            service_providers_path: lookup("SAML_IDP_SERVICE_PROVIDERS_PATH").map(PathBuf::from),
            principal_header: lookup("SAML_IDP_PRINCIPAL_HEADER").filter(|h| !h.is_empty()),
        })
    }

    /// Read the IdP's PEM certificate and private key
    pub fn load_signing_credentials(&self) -> Result<SigningCredentials, ConfigError> {
        let certificate = read_file("SAML_IDP_SIGNING_CERT_PATH", &self.signing_certificate_path)?;
        let key = read_file("SAML_IDP_SIGNING_KEY_PATH", &self.signing_key_path)?;
        SigningCredentials::from_pem(&certificate, &key).map_err(|e| ConfigError::InvalidValue {
            var: "SAML_IDP_SIGNING_KEY_PATH".to_string(),
            message: e.to_string(),
        })
    }

    /// Registered service providers; none when no registry file is configured
    pub fn load_service_providers(&self) -> Result<Vec<ServiceProvider>, ConfigError> {
        let Some(path) = &self.service_providers_path else {
            return Ok(Vec::new());
        };
        let raw = read_file("SAML_IDP_SERVICE_PROVIDERS_PATH", path)?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidValue {
            var: "SAML_IDP_SERVICE_PROVIDERS_PATH".to_string(),
            message: e.to_string(),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.to_string(),
            message: e.to_string(),
        }),
    }
}

fn read_file(var: &str, path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
        var: var.to_string(),
        message: format!("{}: {e}", path.display()),
    })
}
