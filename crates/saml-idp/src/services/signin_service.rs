//! Single sign-on orchestration
//!
//! SP-initiated sign-in validates the AuthnRequest, then either answers at once
//! or parks a [`SigninState`] while the host runs its login or consent step.
//! The callback consumes that state exactly once. IdP-initiated sign-in issues
//! an unsolicited Response.

use super::assertion_builder::{AssertionBuilder, AssertionRequest};
use super::assertion_encryptor::AssertionEncryptor;
use super::message_signer::{MessageSigner, SigningPlan};
use super::request_parser::RequestParser;
use super::request_validator::{
    authentication_decision, context_status, effective_class_ref, AuthnDecision,
    RequestValidator,
};
use super::signature_validator::SignatureValidator;
use crate::bindings::{post, redirect, InboundMessage, OutboundMessage, SAML_RESPONSE};
use crate::error::{MessageKind, SamlError, SamlResult};
use crate::models::{
    AuthnRequest, ConsentDecision, Principal, SamlStatus, ServiceProvider, StatusCode,
};
use crate::session::{InteractionStep, SigninState, SpSession, StoreError};
use crate::state::SamlState;
use crate::xml::SecureXmlLoader;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// What the browser should do next
#[derive(Debug)]
pub enum SigninOutcome {
    /// Visit the host's login or consent page; `state_id` must come back on the
    /// callback
    Interaction { location: String, state_id: String },
    /// Deliver a SAML Response to the ACS
    Respond(OutboundMessage),
}

/// Service for SP- and IdP-initiated SSO
pub struct SigninService<'a> {
    state: &'a SamlState,
}

impl<'a> SigninService<'a> {
    pub fn new(state: &'a SamlState) -> Self {
        Self { state }
    }

    /// Handle an inbound AuthnRequest over either binding
    pub async fn signin(
        &self,
        message: &InboundMessage,
        principal: Option<&Principal>,
    ) -> SamlResult<SigninOutcome> {
        let now = self.state.clock.now();
        let options = &*self.state.options;
        let validator = RequestValidator::new(options, now);

        let relay_state = message.relay_state();
        validator.check_relay_state(relay_state)?;

        let xml = message.decode(MessageKind::AuthnRequest)?;
        let document = SecureXmlLoader::new().load(&xml).map_err(|e| {
            tracing::warn!(error = %e, "AuthnRequest rejected by XML loader");
            SamlError::from(e)
        })?;
        let request = RequestParser::parse(&document)
            .map_err(|e| SamlError::invalid_message(MessageKind::AuthnRequest, e))?;

        tracing::info!(
            sp = %request.issuer,
            request_id = %request.id,
            "SAML AuthnRequest received"
        );

        let sp = self.state.enabled_sp(&request.issuer).await?;
        SignatureValidator::enforce(
            message,
            &document,
            &sp,
            sp.requires_signed_requests(options),
            now,
        )?;

        // ACS resolution has not run yet, so these go to the SP's default ACS
        let early = validator
            .check_version(&request)
            .and_then(|()| validator.check_timing(request.issue_instant, &sp))
            .and_then(|()| {
                validator.check_destination(request.destination.as_deref(), &options.signin_url())
            });
        if let Err(status) = early {
            let acs_url = default_acs(&sp)?;
            return self
                .reject(&sp, &acs_url, Some(&request.id), status, relay_state)
                .await;
        }

        let acs_url = validator.resolve_acs(&request, &sp)?;

        let policy = validator
            .check_protocol_binding(&request)
            .and_then(|()| validator.check_name_id_policy(&request));
        if let Err(status) = policy {
            return self
                .reject(&sp, &acs_url, Some(&request.id), status, relay_state)
                .await;
        }

        let decision = match authentication_decision(&request, principal.is_some()) {
            Ok(decision) => decision,
            Err(status) => {
                return self
                    .reject(&sp, &acs_url, Some(&request.id), status, relay_state)
                    .await
            }
        };

        match (decision, principal) {
            (AuthnDecision::UseExisting, Some(principal)) if !sp.require_consent => {
                let satisfied = self.context_satisfied(&request, principal);
                let status = context_status(request.requested_authn_context.as_ref(), satisfied);
                let message = self
                    .issue_response(&sp, principal, &acs_url, Some(&request), status, relay_state)
                    .await?;
                Ok(SigninOutcome::Respond(message))
            }
            (AuthnDecision::UseExisting, Some(principal)) => {
                let satisfied = self.context_satisfied(&request, principal);
                let mut pending = SigninState::new(
                    request,
                    acs_url,
                    relay_state.map(String::from),
                    InteractionStep::Consent,
                    now,
                    options.signin_state_ttl(),
                );
                pending.requested_context_satisfied = Some(satisfied);
                self.park(pending).await
            }
            _ => {
                let pending = SigninState::new(
                    request,
                    acs_url,
                    relay_state.map(String::from),
                    InteractionStep::Login,
                    now,
                    options.signin_state_ttl(),
                );
                self.park(pending).await
            }
        }
    }

    /// Resume a parked sign-in after the host's login or consent step. Each
    /// `state_id` completes at most once.
    pub async fn signin_callback(
        &self,
        state_id: Option<&str>,
        principal: Option<&Principal>,
        consent: Option<ConsentDecision>,
    ) -> SamlResult<SigninOutcome> {
        let state_id = state_id
            .filter(|id| !id.is_empty())
            .ok_or(SamlError::SigninStateNotFound)?;
        let pending = self
            .state
            .signin_states
            .take_once(state_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    tracing::warn!("Sign-in state unknown, expired or already used");
                    SamlError::SigninStateNotFound
                }
                other => SamlError::Store(other),
            })?;

        let sp = self.state.enabled_sp(&pending.sp_entity_id).await?;
        let relay_state = pending.relay_state.as_deref();
        let request_id = pending.request.id.as_str();

        let Some(principal) = principal else {
            tracing::warn!(sp = %sp.entity_id, request_id = %request_id, "Login step returned without a principal");
            return self
                .reject(
                    &sp,
                    &pending.acs_url,
                    Some(request_id),
                    authn_failed("Authentication failed"),
                    relay_state,
                )
                .await;
        };

        if pending.request.force_authn && principal.authn_instant < pending.created_at {
            tracing::warn!(
                sp = %sp.entity_id,
                subject = %principal.subject_id,
                "ForceAuthn requested but the session was not re-authenticated"
            );
            return self
                .reject(
                    &sp,
                    &pending.acs_url,
                    Some(request_id),
                    authn_failed("Re-authentication required"),
                    relay_state,
                )
                .await;
        }

        match pending.awaiting {
            InteractionStep::Login if sp.require_consent => {
                let satisfied = self.context_satisfied(&pending.request, principal);
                let mut next = SigninState::new(
                    pending.request.clone(),
                    pending.acs_url.clone(),
                    pending.relay_state.clone(),
                    InteractionStep::Consent,
                    self.state.clock.now(),
                    self.state.options.signin_state_ttl(),
                );
                next.requested_context_satisfied = Some(satisfied);
                return self.park(next).await;
            }
            InteractionStep::Consent if consent != Some(ConsentDecision::Granted) => {
                tracing::info!(
                    sp = %sp.entity_id,
                    subject = %principal.subject_id,
                    "User declined consent"
                );
                return self
                    .reject(
                        &sp,
                        &pending.acs_url,
                        Some(request_id),
                        SamlStatus::requester("User declined consent")
                            .with_sub_code(StatusCode::RequestDenied),
                        relay_state,
                    )
                    .await;
            }
            _ => {}
        }

        let satisfied = pending
            .requested_context_satisfied
            .unwrap_or_else(|| self.context_satisfied(&pending.request, principal));
        let status = context_status(pending.request.requested_authn_context.as_ref(), satisfied);
        let message = self
            .issue_response(
                &sp,
                principal,
                &pending.acs_url,
                Some(&pending.request),
                status,
                relay_state,
            )
            .await?;
        Ok(SigninOutcome::Respond(message))
    }

    /// Unsolicited Response to the SP's default ACS
    pub async fn idp_initiated(
        &self,
        sp_entity_id: Option<&str>,
        relay_state: Option<&str>,
        principal: Option<&Principal>,
    ) -> SamlResult<OutboundMessage> {
        let sp_entity_id = sp_entity_id
            .filter(|id| !id.is_empty())
            .ok_or(SamlError::MissingParameter("spEntityId"))?;
        let relay_state = relay_state.filter(|rs| !rs.is_empty());
        RequestValidator::new(&self.state.options, self.state.clock.now())
            .check_relay_state(relay_state)?;
        let principal = principal.ok_or(SamlError::NotAuthenticated)?;

        let sp = self.state.enabled_sp(sp_entity_id).await?;
        if !sp.allow_idp_initiated {
            tracing::warn!(sp = %sp.entity_id, "IdP-initiated sign-in refused");
            return Err(SamlError::IdpInitiatedNotAllowed(sp.entity_id.clone()));
        }
        let acs_url = default_acs(&sp)?;

        tracing::info!(
            sp = %sp.entity_id,
            subject = %principal.subject_id,
            "IdP-initiated SSO"
        );
        self.issue_response(&sp, principal, &acs_url, None, SamlStatus::success(), relay_state)
            .await
    }

    fn context_satisfied(&self, request: &AuthnRequest, principal: &Principal) -> bool {
        request
            .requested_authn_context
            .as_ref()
            .map_or(true, |requested| {
                self.state
                    .authn_context_evaluator
                    .is_satisfied(requested, principal)
            })
    }

    async fn park(&self, pending: SigninState) -> SamlResult<SigninOutcome> {
        let options = &*self.state.options;
        let step = pending.awaiting;
        let sp_entity_id = pending.sp_entity_id.clone();
        let state_id = self.state.signin_states.put(pending).await?;

        let target = match step {
            InteractionStep::Login => &options.login_url,
            InteractionStep::Consent => &options.consent_url,
        };
        let location = redirect::append_query(
            target,
            &format!(
                "returnUrl={}",
                urlencoding::encode(&options.signin_callback_url())
            ),
        );

        tracing::info!(sp = %sp_entity_id, step = ?step, "Sign-in awaiting interaction");
        Ok(SigninOutcome::Interaction { location, state_id })
    }

    /// Sign, optionally encrypt, and POST a success Response
    async fn issue_response(
        &self,
        sp: &ServiceProvider,
        principal: &Principal,
        acs_url: &str,
        request: Option<&AuthnRequest>,
        status: SamlStatus,
        relay_state: Option<&str>,
    ) -> SamlResult<OutboundMessage> {
        let now = self.state.clock.now();
        let credentials = self.state.credentials.signing_credentials().await?;
        let attributes = self.state.attribute_mapper.map(&principal.claims, sp);
        let in_response_to = request.map(|r| r.id.as_str());

        let builder = AssertionBuilder::new(&self.state.options, now);
        let assertion = builder.build_assertion(
            AssertionRequest {
                sp,
                principal,
                acs_url,
                in_response_to,
                requested_name_id_format: request.and_then(AuthnRequest::requested_name_id_format),
                authn_context_class_ref: effective_class_ref(principal),
            },
            attributes,
        )?;
        let name_id = assertion.name_id.clone();
        let response = builder.success_response(acs_url, in_response_to, status, assertion);

        let mut document = response.to_element();
        let plan = SigningPlan::for_success(sp.effective_signing_behavior());
        let signer = MessageSigner::new(&credentials);
        if plan.sign_assertion {
            if let Some(assertion_id) = response.assertion_id() {
                signer.sign_element(&mut document, assertion_id)?;
            }
        }
        if sp.encrypts_assertions() {
            AssertionEncryptor::encrypt_in_place(&mut document, sp, now)?;
        }
        if plan.sign_response {
            signer.sign_element(&mut document, &response.id)?;
        }

        self.record_session(sp, principal, name_id, now).await?;

        tracing::info!(
            sp = %sp.entity_id,
            subject = %principal.subject_id,
            response_id = %response.id,
            encrypted = sp.encrypts_assertions(),
            "SAML Response issued"
        );

        Ok(OutboundMessage::post(
            acs_url,
            SAML_RESPONSE,
            post::encode_message(&document.to_document()),
            relay_state.map(String::from),
        ))
    }

    async fn record_session(
        &self,
        sp: &ServiceProvider,
        principal: &Principal,
        name_id: crate::saml::ResolvedNameId,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        self.state
            .sp_sessions
            .record(SpSession {
                id: Uuid::new_v4(),
                subject_id: principal.subject_id.clone(),
                session_id: principal.session_id.clone(),
                sp_entity_id: sp.entity_id.clone(),
                session_index: principal.session_id.clone(),
                name_id: name_id.value,
                name_id_format: name_id.format,
                sp_name_qualifier: name_id.sp_name_qualifier,
                created_at: now,
            })
            .await?;
        Ok(())
    }

    /// SAML error Response, never carrying an assertion
    async fn reject(
        &self,
        sp: &ServiceProvider,
        acs_url: &str,
        in_response_to: Option<&str>,
        status: SamlStatus,
        relay_state: Option<&str>,
    ) -> SamlResult<SigninOutcome> {
        tracing::warn!(
            sp = %sp.entity_id,
            status = %status.code.uri(),
            sub_status = ?status.sub_code.map(StatusCode::uri),
            message = ?status.message,
            "Returning SAML error response"
        );

        let builder = AssertionBuilder::new(&self.state.options, self.state.clock.now());
        let response = builder.error_response(acs_url, in_response_to, status);
        let mut document = response.to_element();

        if SigningPlan::for_error(sp.effective_signing_behavior()).sign_response {
            let credentials = self.state.credentials.signing_credentials().await?;
            MessageSigner::new(&credentials).sign_element(&mut document, &response.id)?;
        }

        Ok(SigninOutcome::Respond(OutboundMessage::post(
            acs_url,
            SAML_RESPONSE,
            post::encode_message(&document.to_document()),
            relay_state.map(String::from),
        )))
    }
}

fn default_acs(sp: &ServiceProvider) -> SamlResult<String> {
    sp.default_acs_url()
        .map(String::from)
        .ok_or_else(|| SamlError::ServiceProviderMisconfigured {
            entity_id: sp.entity_id.clone(),
            detail: "no AssertionConsumerService URLs registered".to_string(),
        })
}

fn authn_failed(message: &str) -> SamlStatus {
    SamlStatus::responder(message).with_sub_code(StatusCode::AuthnFailed)
}
