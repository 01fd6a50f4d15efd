//! SAML Single Logout orchestration
//!
//! SP-initiated logout ends the subject's sessions and defers the final
//! LogoutResponse until the host has terminated its own session and calls back
//! with the `logoutId`. IdP-initiated logout hands the host one front-channel
//! message per SP that holds a session.

use super::logout_parser::parse_logout_request;
use super::request_validator::RequestValidator;
use super::signature_validator::SignatureValidator;
use super::slo_builder::SloBuilder;
use crate::bindings::{redirect, InboundMessage, OutboundMessage, SAML_REQUEST, SAML_RESPONSE};
use crate::error::{MessageKind, SamlError, SamlResult};
use crate::models::{
    FrontChannelTarget, IdpLogoutResponse, LogoutPendingResponse, LogoutRequest, Principal,
    SamlStatus, ServiceProvider, SingleLogoutService,
};
use crate::saml::constants::SAML_VERSION;
use crate::session::{LogoutMessage, SpSession, StoreError};
use crate::state::SamlState;
use crate::xml::SecureXmlLoader;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// What the host should do with an SP-initiated LogoutRequest
#[derive(Debug)]
pub enum LogoutOutcome {
    /// Send the LogoutResponse straight back to the SP
    Respond(OutboundMessage),
    /// Terminate the host session, notify the other SPs, then call back
    Pending(LogoutPendingResponse),
}

/// Service for SAML Single Logout orchestration
pub struct SloService<'a> {
    state: &'a SamlState,
}

impl<'a> SloService<'a> {
    pub fn new(state: &'a SamlState) -> Self {
        Self { state }
    }

    /// Handle a LogoutRequest sent by an SP
    pub async fn sp_initiated_logout(&self, message: &InboundMessage) -> SamlResult<LogoutOutcome> {
        let now = self.state.clock.now();
        let options = &*self.state.options;
        let relay_state = message.relay_state();
        RequestValidator::new(options, now).check_relay_state(relay_state)?;

        let xml = message.decode(MessageKind::LogoutRequest)?;
        let document = SecureXmlLoader::new().load(&xml).map_err(|e| {
            tracing::warn!(error = %e, "LogoutRequest rejected by XML loader");
            SamlError::from(e)
        })?;
        let request = parse_logout_request(&document)
            .map_err(|e| SamlError::invalid_message(MessageKind::LogoutRequest, e))?;

        tracing::info!(
            sp = %request.issuer,
            request_id = %request.id,
            "SAML LogoutRequest received"
        );

        let sp = self.state.enabled_sp(&request.issuer).await?;
        SignatureValidator::enforce(
            message,
            &document,
            &sp,
            sp.requires_signed_requests(options),
            now,
        )?;
        // Nothing can be answered without an endpoint, so no session is touched
        slo_endpoint(&sp)?;

        if let Err(status) = self.check_logout_request(&request, &sp, now) {
            return self
                .respond_to_sp(&sp, Some(&request.id), &status, relay_state)
                .await
                .map(LogoutOutcome::Respond);
        }

        let session = match request.session_index.as_deref() {
            Some(index) => {
                self.state
                    .sp_sessions
                    .find_by_session_index(&sp.entity_id, index)
                    .await?
            }
            None => None,
        };
        let Some(session) = session.filter(|s| s.name_id == request.name_id.value) else {
            tracing::info!(
                sp = %sp.entity_id,
                session_index = ?request.session_index,
                "No matching SP session, acknowledging logout"
            );
            return self
                .respond_to_sp(&sp, Some(&request.id), &SamlStatus::success(), relay_state)
                .await
                .map(LogoutOutcome::Respond);
        };

        let others: Vec<SpSession> = self
            .state
            .sp_sessions
            .snapshot_for_subject(&session.subject_id)
            .await?
            .into_iter()
            .filter(|s| s.sp_entity_id != sp.entity_id)
            .collect();
        let front_channel = self.front_channel(others, now).await?;

        let logout_id = self
            .state
            .logout_messages
            .put(LogoutMessage {
                subject_id: session.subject_id.clone(),
                session_id: session.session_id.clone(),
                sp_entity_id: sp.entity_id.clone(),
                request_id: request.id.clone(),
                relay_state: relay_state.map(String::from),
                created_at: now,
                expires_at: now + options.logout_message_ttl(),
            })
            .await?;

        let ended = self
            .state
            .sp_sessions
            .remove_all_for_subject(&session.subject_id)
            .await?;

        tracing::info!(
            sp = %sp.entity_id,
            subject = %session.subject_id,
            sessions_ended = ended,
            notify = front_channel.len(),
            "SP-initiated logout pending host session termination"
        );

        Ok(LogoutOutcome::Pending(LogoutPendingResponse {
            callback_url: redirect::append_query(
                &options.logout_callback_url(),
                &format!("logoutId={}", urlencoding::encode(&logout_id)),
            ),
            logout_id,
            front_channel,
        }))
    }

    /// Finish a deferred SP-initiated logout. Each `logoutId` completes once.
    pub async fn logout_callback(&self, logout_id: Option<&str>) -> SamlResult<OutboundMessage> {
        let logout_id = logout_id
            .filter(|id| !id.is_empty())
            .ok_or(SamlError::MissingParameter("logoutId"))?;

        let pending = self
            .state
            .logout_messages
            .take_once(logout_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    tracing::warn!("Logout message unknown, expired or already used");
                    SamlError::LogoutMessageNotFound
                }
                other => SamlError::Store(other),
            })?;

        let sp = self.state.enabled_sp(&pending.sp_entity_id).await?;
        tracing::info!(
            sp = %sp.entity_id,
            subject = %pending.subject_id,
            "Completing SP-initiated logout"
        );
        self.respond_to_sp(
            &sp,
            Some(&pending.request_id),
            &SamlStatus::success(),
            pending.relay_state.as_deref(),
        )
        .await
    }

    /// End every SP session of the signed-in subject and build the messages
    /// the host must deliver through the browser
    pub async fn idp_initiated_logout(
        &self,
        principal: Option<&Principal>,
    ) -> SamlResult<IdpLogoutResponse> {
        let principal = principal.ok_or(SamlError::NotAuthenticated)?;
        let now = self.state.clock.now();

        let sessions = self
            .state
            .sp_sessions
            .snapshot_for_subject(&principal.subject_id)
            .await?;
        let front_channel = self.front_channel(sessions, now).await?;
        let sessions_ended = self
            .state
            .sp_sessions
            .remove_all_for_subject(&principal.subject_id)
            .await?;

        tracing::info!(
            subject = %principal.subject_id,
            sessions_ended,
            notify = front_channel.len(),
            "IdP-initiated logout"
        );

        Ok(IdpLogoutResponse {
            sessions_ended,
            front_channel,
        })
    }

    fn check_logout_request(
        &self,
        request: &LogoutRequest,
        sp: &ServiceProvider,
        now: DateTime<Utc>,
    ) -> Result<(), SamlStatus> {
        let options = &*self.state.options;
        let validator = RequestValidator::new(options, now);

        if request.version != SAML_VERSION {
            tracing::warn!(version = %request.version, "Unsupported SAML version");
            return Err(SamlStatus::version_mismatch());
        }
        if let Some(issue_instant) = request.issue_instant {
            validator.check_timing(issue_instant, sp)?;
        }
        if let Some(not_on_or_after) = request.not_on_or_after {
            if now > not_on_or_after + sp.clock_skew(options) {
                tracing::warn!(
                    sp = %sp.entity_id,
                    not_on_or_after = %not_on_or_after,
                    "LogoutRequest past NotOnOrAfter"
                );
                return Err(SamlStatus::requester("Request has expired"));
            }
        }
        validator.check_destination(request.destination.as_deref(), &options.logout_url())
    }

    /// LogoutResponse to the SP's SLO endpoint in its binding
    async fn respond_to_sp(
        &self,
        sp: &ServiceProvider,
        in_response_to: Option<&str>,
        status: &SamlStatus,
        relay_state: Option<&str>,
    ) -> SamlResult<OutboundMessage> {
        let slo = slo_endpoint(sp)?;
        let credentials = self.state.credentials.signing_credentials().await?;
        let builder = SloBuilder::new(
            &self.state.options.entity_id,
            &credentials,
            self.state.clock.now(),
        );
        if !status.is_success() {
            tracing::warn!(
                sp = %sp.entity_id,
                status = %status.code.uri(),
                message = ?status.message,
                "Returning LogoutResponse with error status"
            );
        }
        let response = builder.logout_response(&slo.location, in_response_to, status);
        builder.package(response, slo.binding, &slo.location, SAML_RESPONSE, relay_state)
    }

    /// One signed LogoutRequest per enabled SP with an SLO endpoint. Only the
    /// most recent session per SP is kept.
    async fn front_channel(
        &self,
        sessions: Vec<SpSession>,
        now: DateTime<Utc>,
    ) -> SamlResult<Vec<FrontChannelTarget>> {
        let mut latest: HashMap<String, SpSession> = HashMap::new();
        for session in sessions {
            match latest.get(&session.sp_entity_id) {
                Some(existing) if existing.created_at > session.created_at => {}
                _ => {
                    latest.insert(session.sp_entity_id.clone(), session);
                }
            }
        }
        if latest.is_empty() {
            return Ok(Vec::new());
        }

        let credentials = self.state.credentials.signing_credentials().await?;
        let mut sessions: Vec<SpSession> = latest.into_values().collect();
        sessions.sort_by(|a, b| a.sp_entity_id.cmp(&b.sp_entity_id));

        let mut targets = Vec::with_capacity(sessions.len());
        for session in sessions {
            let Some(sp) = self
                .state
                .service_providers
                .find_enabled(&session.sp_entity_id)
                .await?
            else {
                tracing::debug!(sp = %session.sp_entity_id, "Skipping logout for unknown or disabled SP");
                continue;
            };
            let Some(slo) = sp.single_logout_service.as_ref() else {
                tracing::debug!(sp = %sp.entity_id, "SP has no SLO endpoint");
                continue;
            };
            let builder = SloBuilder::new(&self.state.options.entity_id, &credentials, now);
            targets.push(front_channel_target(&builder, &sp, slo, &session)?);
        }
        Ok(targets)
    }
}

fn front_channel_target(
    builder: &SloBuilder<'_>,
    sp: &ServiceProvider,
    slo: &SingleLogoutService,
    session: &SpSession,
) -> SamlResult<FrontChannelTarget> {
    let request = builder.logout_request(&slo.location, session);
    let message = builder.package(request, slo.binding, &slo.location, SAML_REQUEST, None)?;

    let (url, form) = match &message {
        OutboundMessage::Redirect { location } => (Some(location.clone()), None),
        OutboundMessage::Post { .. } => (None, message.html()),
    };
    Ok(FrontChannelTarget {
        sp_entity_id: sp.entity_id.clone(),
        binding: slo.binding.uri().to_string(),
        destination: slo.location.clone(),
        url,
        form,
    })
}

fn slo_endpoint(sp: &ServiceProvider) -> SamlResult<&SingleLogoutService> {
    sp.single_logout_service.as_ref().ok_or_else(|| {
        tracing::warn!(sp = %sp.entity_id, "Logout message from SP without SLO endpoint");
        SamlError::SingleLogoutNotSupported(sp.entity_id.clone())
    })
}
