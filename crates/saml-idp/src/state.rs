//! Shared state for the SAML handlers

use crate::clock::{Clock, SystemClock};
use crate::config::SamlIdpOptions;
use crate::error::{SamlError, SamlResult};
use crate::models::{ServiceProvider, ServiceProviderStore};
use crate::saml::{AttributeMapper, DefaultAttributeMapper, SigningCredentialProvider};
use crate::services::request_validator::{AuthnContextEvaluator, RankedAuthnContextEvaluator};
use crate::session::{
    InMemoryOneTimeStore, InMemorySpSessionStore, LogoutMessage, LogoutMessageStore, SigninState,
    SigninStateStore, SpSessionStore,
};
use std::sync::Arc;
use std::time::Duration;

/// Application state for SAML handlers
#[derive(Clone)]
pub struct SamlState {
    pub options: Arc<SamlIdpOptions>,
    pub clock: Arc<dyn Clock>,
    pub service_providers: Arc<dyn ServiceProviderStore>,
    /// Pending sign-ins parked while the login or consent step runs
    pub signin_states: Arc<SigninStateStore>,
    /// Deferred completions of SP-initiated logout
    pub logout_messages: Arc<LogoutMessageStore>,
    pub sp_sessions: Arc<dyn SpSessionStore>,
    pub credentials: Arc<dyn SigningCredentialProvider>,
    pub attribute_mapper: Arc<dyn AttributeMapper>,
    pub authn_context_evaluator: Arc<dyn AuthnContextEvaluator>,
}

impl SamlState {
    /// State backed by in-process stores and the wall clock
    pub fn in_memory(
        options: SamlIdpOptions,
        service_providers: Arc<dyn ServiceProviderStore>,
        credentials: Arc<dyn SigningCredentialProvider>,
    ) -> Self {
        Self::in_memory_with_clock(options, service_providers, credentials, Arc::new(SystemClock))
    }

    pub fn in_memory_with_clock(
        options: SamlIdpOptions,
        service_providers: Arc<dyn ServiceProviderStore>,
        credentials: Arc<dyn SigningCredentialProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let signin_states: Arc<SigninStateStore> = Arc::new(InMemoryOneTimeStore::<SigninState>::new(
            Duration::from_secs(options.signin_state_ttl_secs),
            clock.clone(),
        ));
        let logout_messages: Arc<LogoutMessageStore> =
            Arc::new(InMemoryOneTimeStore::<LogoutMessage>::new(
                Duration::from_secs(options.logout_message_ttl_secs),
                clock.clone(),
            ));

        Self {
            attribute_mapper: Arc::new(DefaultAttributeMapper::new(options.clone())),
            authn_context_evaluator: Arc::new(RankedAuthnContextEvaluator::default()),
            options: Arc::new(options),
            clock,
            service_providers,
            signin_states,
            logout_messages,
            sp_sessions: Arc::new(InMemorySpSessionStore::new()),
            credentials,
        }
    }

    /// Replace the claim-to-attribute resolution entirely
    #[must_use]
    pub fn with_attribute_mapper(mut self, mapper: Arc<dyn AttributeMapper>) -> Self {
        self.attribute_mapper = mapper;
        self
    }

    #[must_use]
    pub fn with_authn_context_evaluator(
        mut self,
        evaluator: Arc<dyn AuthnContextEvaluator>,
    ) -> Self {
        self.authn_context_evaluator = evaluator;
        self
    }

    #[must_use]
    pub fn with_sp_sessions(mut self, sp_sessions: Arc<dyn SpSessionStore>) -> Self {
        self.sp_sessions = sp_sessions;
        self
    }

    /// Enabled SP by EntityID
    pub(crate) async fn enabled_sp(&self, entity_id: &str) -> SamlResult<ServiceProvider> {
        self.service_providers
            .find_enabled(entity_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(sp = %entity_id, "Unknown or disabled service provider");
                SamlError::UnknownServiceProvider(entity_id.to_string())
            })
    }

    /// Drop every pending sign-in and logout parked for an SP, e.g. after its
    /// configuration changed or it was disabled
    pub async fn invalidate_service_provider(&self, entity_id: &str) -> SamlResult<()> {
        self.signin_states.invalidate_tag(entity_id).await?;
        self.logout_messages.invalidate_tag(entity_id).await?;
        tracing::info!(sp = %entity_id, "Invalidated pending SAML state for service provider");
        Ok(())
    }
}
