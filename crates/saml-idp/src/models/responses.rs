//! HTTP-facing request/response shapes and the auto-submit form

use serde::{Deserialize, Serialize};

/// POST binding form fields for inbound requests
#[derive(Debug, Deserialize)]
pub struct SamlPostForm {
    #[serde(rename = "SAMLRequest")]
    pub saml_request: Option<String>,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// Query for unsolicited (IdP-initiated) sign-in
#[derive(Debug, Deserialize)]
pub struct IdpInitiatedQuery {
    #[serde(rename = "spEntityId")]
    pub sp_entity_id: Option<String>,
    #[serde(rename = "relayState")]
    pub relay_state: Option<String>,
}

/// Outcome of the host's consent step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentDecision {
    Granted,
    Denied,
}

#[derive(Debug, Default, Deserialize)]
pub struct SigninCallbackQuery {
    pub consent: Option<ConsentDecision>,
}

/// Query for resuming a deferred logout
#[derive(Debug, Deserialize)]
pub struct LogoutCallbackQuery {
    #[serde(rename = "logoutId")]
    pub logout_id: Option<String>,
}

/// Body returned to the host when a logout needs session termination first
#[derive(Debug, Serialize)]
pub struct LogoutPendingResponse {
    pub logout_id: String,
    pub callback_url: String,
    pub front_channel: Vec<FrontChannelTarget>,
}

/// One SP to notify, as presented to the host for rendering (iframes or redirects)
#[derive(Debug, Serialize)]
pub struct FrontChannelTarget {
    pub sp_entity_id: String,
    pub binding: String,
    pub destination: String,
    /// Full redirect URL (Redirect binding)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Auto-submit HTML document (POST binding)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
}

/// Front-channel messages for an IdP-initiated logout
#[derive(Debug, Serialize)]
pub struct IdpLogoutResponse {
    pub sessions_ended: u64,
    pub front_channel: Vec<FrontChannelTarget>,
}

/// Auto-submit HTML form for the HTTP-POST binding
#[must_use]
pub fn generate_auto_submit_form(
    action: &str,
    parameter: &str,
    value: &str,
    relay_state: Option<&str>,
) -> String {
    let relay_input = relay_state
        .map(|rs| {
            format!(
                r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                html_escape(rs)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Working...</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="POST" action="{}">
        <input type="hidden" name="{}" value="{}"/>
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
        html_escape(action),
        html_escape(parameter),
        html_escape(value),
        relay_input
    )
}

/// HTML escape for XSS prevention
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
